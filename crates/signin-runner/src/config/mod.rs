pub mod schema;
pub mod vars;

pub use schema::{
    BrowserConfig, Condition, Config, CredentialsConfig, FlowSettings, OnFailure, RetryConfig,
    SuccessCondition, TargetUrl, Viewport,
};
pub use vars::{VarDecl, Vars};
