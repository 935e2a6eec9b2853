//! Reference remote store served over HTTP by `moodsync-server`.

mod keys;
mod routes;
mod storage;

pub use keys::{ApiKeyStore, AuthUser};
pub use routes::{router, AppState};
pub use storage::{MoodStore, StoreError};
