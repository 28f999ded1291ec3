pub mod browser;
pub mod cdp;
pub mod error;
pub mod page;

// Re-export commonly used items
pub use browser::launch::{find_chrome, launch, LaunchOptions, LaunchedBrowser};
pub use browser::profiles::{Profile, ProfileStore};
pub use browser::session::{Browser, Tab};
pub use cdp::{CdpTransport, Endpoint, TargetInfo};
pub use error::{Result, WebtapError};
pub use page::scan::{format_catalog, Element};
pub use page::Page;
