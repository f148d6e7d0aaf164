//! Source of the student population for a run.

use std::sync::{Arc, RwLock};

use crate::error::EngineResult;
use crate::models::Student;

/// Supplies the students a settlement run evaluates.
///
/// Implementations return a point-in-time copy; the engine never writes back.
pub trait StudentDirectory: Send + Sync {
    /// Returns every student in scope.
    fn students(&self) -> EngineResult<Vec<Student>>;
}

impl StudentDirectory for Vec<Student> {
    fn students(&self) -> EngineResult<Vec<Student>> {
        Ok(self.clone())
    }
}

impl StudentDirectory for RwLock<Vec<Student>> {
    fn students(&self) -> EngineResult<Vec<Student>> {
        Ok(self.read().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

impl<T: StudentDirectory + ?Sized> StudentDirectory for Arc<T> {
    fn students(&self) -> EngineResult<Vec<Student>> {
        (**self).students()
    }
}
