pub mod condition;
pub mod material;
pub mod prompt;
pub mod refs;
pub mod result;

pub use condition::ConditionRunner;
pub use material::MaterialRunner;
pub use prompt::PromptRunner;
pub use result::ResultRunner;
