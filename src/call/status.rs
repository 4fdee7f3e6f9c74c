//! The call status out-parameter shared by every fallible call.

use std::fmt;

use crate::buffer::CoreBuffer;
use crate::codec::lower_to_vec;

/// Outcome codes carried in [`CallStatus::code`].
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatusCode {
    /// The call succeeded; the error buffer is empty.
    Success = 0,
    /// The error buffer holds a serialized declared error.
    Error = 1,
    /// The error buffer holds a serialized diagnostic string.
    Panic = 2,
    /// The async operation was cancelled before producing a result.
    Cancelled = 3,
}

impl TryFrom<i8> for CallStatusCode {
    type Error = i8;

    fn try_from(code: i8) -> Result<Self, i8> {
        match code {
            0 => Ok(Self::Success),
            1 => Ok(Self::Error),
            2 => Ok(Self::Panic),
            3 => Ok(Self::Cancelled),
            other => Err(other),
        }
    }
}

impl fmt::Display for CallStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "OK",
            Self::Error => "ERROR",
            Self::Panic => "PANIC",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// `{code, error_buf}` out-parameter.
///
/// Callers create it zeroed (`OK`, empty buffer) on their own stack; the callee
/// sets it exactly once before returning.
#[repr(C)]
#[derive(Debug, Default)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: CoreBuffer,
}

impl CallStatus {
    pub const fn new() -> Self {
        Self {
            code: CallStatusCode::Success as i8,
            error_buf: CoreBuffer::new(),
        }
    }

    /// Decoded status code, or the raw value if it is not a known code.
    pub fn status_code(&self) -> Result<CallStatusCode, i8> {
        CallStatusCode::try_from(self.code)
    }

    pub fn is_success(&self) -> bool {
        self.code == CallStatusCode::Success as i8
    }

    pub fn set_success(&mut self) {
        self.code = CallStatusCode::Success as i8;
        self.error_buf = CoreBuffer::new();
    }

    /// Record a declared error whose serialized form is in `error_buf`.
    pub fn set_error(&mut self, error_buf: CoreBuffer) {
        self.code = CallStatusCode::Error as i8;
        self.error_buf = error_buf;
    }

    /// Record an unrecoverable failure with a diagnostic message.
    pub fn set_panic(&mut self, message: &str) {
        self.code = CallStatusCode::Panic as i8;
        self.error_buf = lower_message(message);
    }

    pub fn set_cancelled(&mut self) {
        self.code = CallStatusCode::Cancelled as i8;
        self.error_buf = CoreBuffer::new();
    }

    /// Take the error buffer out, leaving an empty one behind.
    pub fn take_error_buf(&mut self) -> CoreBuffer {
        std::mem::take(&mut self.error_buf)
    }
}

/// Serialize a panic message, truncating anything that cannot be length-prefixed.
fn lower_message(message: &str) -> CoreBuffer {
    let mut end = message.len().min(i32::MAX as usize - 4);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = message.get(..end).unwrap_or_default();
    lower_to_vec(truncated)
        .map(CoreBuffer::from_vec)
        .unwrap_or_default()
}
