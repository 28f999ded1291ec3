use std::path::PathBuf;

use clap::{Parser, Subcommand};
use webtap::browser::launch::{launch, LaunchOptions};
use webtap::browser::profiles::ProfileStore;
use webtap::{format_catalog, Browser};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a real browser over CDP", long_about = None)]
struct Args {
    /// Debugging endpoint of the browser to control
    #[arg(long, env = "CDP_URL", default_value = "http://127.0.0.1:9222")]
    cdp_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a browser for a named profile (created if missing)
    Launch {
        profile: Option<String>,
        #[arg(long)]
        headless: bool,
        /// Override the profile's registered port
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        chrome_path: Option<PathBuf>,
    },
    /// List profiles
    Profiles,
    /// Create a profile
    CreateProfile {
        name: String,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Delete a profile and its browser data
    DeleteProfile { name: String },
    /// Set the default profile
    DefaultProfile { name: String },
    /// List open tabs
    Tabs,
    /// Switch to a tab by index
    Tab { index: usize },
    /// Open a new tab
    Newtab { url: Option<String> },
    /// Close a tab (current tab when no index given)
    CloseTab { index: Option<usize> },
    /// Navigate the current tab
    Open { url: String },
    /// Print the current URL
    Url,
    /// Go back in history
    Back,
    /// Go forward in history
    Forward,
    /// Reload the current tab
    Refresh,
    /// List interactive elements as a numbered catalog
    Elements {
        /// CSS selector restricting the scan to a container
        #[arg(long)]
        scope: Option<String>,
    },
    /// Click an element by catalog index
    Click { index: usize },
    /// Type text into an element by catalog index (appends)
    Type { index: usize, text: String },
    /// Empty a text element by catalog index
    Clear { index: usize },
    /// Extract visible page text
    Text {
        #[arg(long)]
        scope: Option<String>,
    },
    /// Print an element's outerHTML
    Html { selector: String },
    /// Evaluate JavaScript in the page
    Eval { expression: String },
    /// Save a screenshot of the current tab
    Screenshot { path: Option<PathBuf> },
    /// Upload a file to a file input
    Upload {
        path: PathBuf,
        #[arg(long)]
        selector: Option<String>,
    },
    /// Scroll the page (up, down, top, bottom)
    Scroll {
        direction: String,
        #[arg(long, default_value_t = 600)]
        amount: i64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<String> {
    // Profile commands work without a running browser.
    match &args.command {
        Command::Launch {
            profile,
            headless,
            port,
            chrome_path,
        } => {
            let store = ProfileStore::open_default()?;
            let profile = store.get_or_create(profile.as_deref())?;
            let launched = launch(LaunchOptions {
                profile: profile.name.clone(),
                port: port.unwrap_or(profile.port),
                user_data_dir: profile.path.clone(),
                headless: *headless,
                chrome_path: chrome_path.clone(),
            })
            .await?;
            return Ok(format!(
                "Launched profile '{}' — control it at {}",
                profile.name,
                launched.cdp_url()
            ));
        }
        Command::Profiles => {
            let store = ProfileStore::open_default()?;
            let profiles = store.list();
            if profiles.is_empty() {
                return Ok("(no profiles — create one with: webtap launch)".to_string());
            }
            return Ok(profiles
                .iter()
                .map(|p| {
                    let marker = if p.is_default { " (default)" } else { "" };
                    format!("{} — port {}{marker}", p.name, p.port)
                })
                .collect::<Vec<_>>()
                .join("\n"));
        }
        Command::CreateProfile { name, port } => {
            let store = ProfileStore::open_default()?;
            let p = store.create(name, *port)?;
            return Ok(format!("Created profile '{}' on port {}", p.name, p.port));
        }
        Command::DeleteProfile { name } => {
            let store = ProfileStore::open_default()?;
            store.delete(name)?;
            return Ok(format!("Deleted profile '{name}'"));
        }
        Command::DefaultProfile { name } => {
            let store = ProfileStore::open_default()?;
            store.set_default(name)?;
            return Ok(format!("Default profile is now '{name}'"));
        }
        _ => {}
    }

    let browser = Browser::connect(&args.cdp_url).await?;

    let output = match args.command {
        Command::Tabs => {
            let tabs = browser.tabs().await?;
            if tabs.is_empty() {
                "(no open tabs)".to_string()
            } else {
                tabs.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Tab { index } => browser.switch_to(index).await?,
        Command::Newtab { url } => browser.new_tab(url.as_deref()).await?,
        Command::CloseTab { index } => browser.close_tab(index).await?,
        Command::Open { url } => browser.open(&url).await?,
        Command::Url => browser.url().await?,
        Command::Back => browser.back().await?,
        Command::Forward => browser.forward().await?,
        Command::Refresh => browser.refresh().await?,
        Command::Elements { scope } => {
            let catalog = browser.scan(scope.as_deref()).await?;
            if catalog.is_empty() {
                "(no interactive elements)".to_string()
            } else {
                format_catalog(&catalog)
            }
        }
        Command::Click { index } => browser.click(index).await?,
        Command::Type { index, text } => browser.type_text(index, &text).await?,
        Command::Clear { index } => browser.clear(index).await?,
        Command::Text { scope } => browser.text(scope.as_deref()).await?,
        Command::Html { selector } => browser.html(&selector).await?,
        Command::Eval { expression } => {
            let value = browser.eval(&expression).await?;
            serde_json::to_string_pretty(&value)?
        }
        Command::Screenshot { path } => {
            let written = browser.screenshot(path.as_deref()).await?;
            format!("Saved screenshot: {}", written.display())
        }
        Command::Upload { path, selector } => browser.upload(&path, selector.as_deref()).await?,
        Command::Scroll { direction, amount } => browser.scroll(&direction, amount).await?,
        // Handled above.
        Command::Launch { .. }
        | Command::Profiles
        | Command::CreateProfile { .. }
        | Command::DeleteProfile { .. }
        | Command::DefaultProfile { .. } => unreachable!(),
    };

    Ok(output)
}
