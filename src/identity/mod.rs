//! Session core: credential storage, the current principal, login and forced logout.
//! Keep the public surface thin and split implementation across sub-modules.

mod navigation;
mod principal;
mod provider;
mod session;
mod token_store;

pub use navigation::{Navigator, NoopNavigator, RecordingNavigator};
pub use principal::{Principal, ADMIN_ROLE_ID};
pub use provider::{LoginError, LoginFailureReason, LoginFlow, LoginRequest, LoginResponse, LOGIN_PATH};
pub use session::{PrincipalState, SessionContext, SessionResolver, WHO_AM_I_PATH};
pub use token_store::{BearerToken, FileTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
