pub mod error;
pub mod task;
pub mod tree;
pub mod types;
pub mod value;
pub mod variable;

pub use error::{InvocableInfo, NfError, NfResult};
pub use task::{TaskHandle, TaskStatus};
pub use tree::*;
pub use types::*;
pub use value::*;
pub use variable::DeclaredVariable;
