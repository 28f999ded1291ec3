pub mod launch;
pub mod profiles;
pub mod session;

pub use launch::{find_chrome, launch, LaunchOptions, LaunchedBrowser};
pub use profiles::{Profile, ProfileStore};
pub use session::{Browser, Tab};
