// SmartMark services
// Services provide core functionality: the backend contract and its
// implementations, the change feed hub, session persistence and settings.

pub mod backend;
pub mod change_hub;
pub mod jwt;
pub mod local_backend;
pub mod rest_backend;
pub mod session_store;
pub mod settings_engine;
