pub mod identity;
pub mod results;
pub mod settings;

pub use identity::{
    Claims, IdentityInfo, IdentityRecord, IdentityRole, LoginRequest, LoginResponse, NewIdentity,
    ProfileUpdate,
};
pub use results::{SubmitResultRequest, TestResult, TestSection};
pub use settings::{
    AdmissionSettings, AppConfig, DEFAULT_JWT_SECRET, ServerConfig, SessionSettings,
    StorageConfig,
};
