//! Value-plus-diagnostics carrier returned by the transforms, merge and
//! populate.
use crate::exception::Exception;

#[derive(Clone, Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub error: Option<Exception>,
    pub warning: Option<Exception>,
}

impl<T> Outcome<T> {
    /// Keep each tree only if it actually holds a message.
    pub fn new(value: T, error: Exception, warning: Option<Exception>) -> Self {
        Self {
            value,
            error: error.has_exception().then_some(error),
            warning: warning.filter(Exception::has_exception),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, Exception> {
        match self.error {
            None => Ok(self.value),
            Some(error) => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome { value: f(self.value), error: self.error, warning: self.warning }
    }
}
