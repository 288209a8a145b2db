use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chromecat::capture::ChromeLauncher;
use chromecat::compare::{Comparator, ComparisonRequest, ComparisonResponse, default_regions, diff_png_files};
use chromecat::config::{self, StoreSettings, parse_viewport};
use chromecat::region::{RegionSpec, SelectorRegion};
use chromecat::scrape::{ScrapeRequest, take_scrape};
use chromecat::screenshot::{ScreenshotRequest, take_screenshot};
use chromecat::session::PageTiming;
use chromecat::store::{self as artifacts, ArtifactStore};
use chromecat::{batch, telemetry};

/// Chromecat - region-by-region visual regression between a live page and its rebuild
#[derive(Parser, Debug)]
#[command(
    name = "chromecat",
    about = "Compare page regions of a live site and a test site with headless Chrome",
    after_help = "ENVIRONMENT VARIABLES:\n\
        CHROMECAT_THRESHOLD        Differ sensitivity (0-1)\n\
        CHROMECAT_VIEWPORT         Viewport preset or WxH\n\
        CHROMECAT_NAV_TIMEOUT      Navigation deadline (seconds)\n\
        CHROMECAT_SETTLE_MS        Settle delay after navigation (ms)\n\
        CHROMECAT_ARTIFACT_DIR     Filesystem artifact store root\n\
        CHROMECAT_STORE_URL        HTTP object store base URL\n\
        CHROMECAT_CHROME_PATH      Chrome/Chromium binary\n\
        RUST_LOG                   Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Directory for artifacts when no store URL is set
    #[arg(long, env = "CHROMECAT_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// HTTP object store base URL (PUT/GET per key)
    #[arg(long, env = "CHROMECAT_STORE_URL")]
    store_url: Option<String>,
}

impl StoreArgs {
    fn open(&self) -> Arc<dyn ArtifactStore> {
        let mut settings: StoreSettings = config::get().store.clone();
        if let Some(dir) = &self.artifact_dir {
            settings.artifact_dir = dir.clone();
        }
        if let Some(url) = &self.store_url {
            settings.url = Some(url.clone());
        }
        artifacts::from_settings(&settings)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare regions of a live page and a test page
    Compare {
        /// Reference page
        #[arg(long, required_unless_present = "request")]
        live: Option<String>,

        /// Page under test
        #[arg(long, required_unless_present = "request")]
        test: Option<String>,

        /// Full request as JSON (liveUrl, testUrl, regions, threshold, viewport)
        #[arg(long, conflicts_with_all = ["live", "test"])]
        request: Option<PathBuf>,

        /// Region as NAME=SELECTOR, repeatable (default: built-in regions)
        #[arg(short, long = "region")]
        regions: Vec<String>,

        /// Differ sensitivity in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Viewport: desktop (1280x900), laptop (1366x768), tablet (768x1024), mobile (375x812), or WxH
        #[arg(long, short = 's')]
        size: Option<String>,

        #[command(flatten)]
        store: StoreArgs,

        /// Output the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Screenshot a page or one element
    Screenshot {
        url: String,

        /// Capture only the first element matching this selector
        #[arg(long)]
        selector: Option<String>,

        /// Capture the viewport instead of the whole document
        #[arg(long)]
        viewport_only: bool,

        /// Extra selectors to hide, repeatable
        #[arg(long = "hide")]
        hide: Vec<String>,

        /// Viewport preset or WxH
        #[arg(long, short = 's')]
        size: Option<String>,

        #[command(flatten)]
        store: StoreArgs,

        /// Also write the PNG to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Scrape a page's title, images and sections and store a full-page screenshot
    Scrape {
        url: String,

        /// Viewport preset or WxH
        #[arg(long, short = 's')]
        size: Option<String>,

        /// Print the sections as a region list for `compare --request`
        #[arg(long, conflicts_with = "json")]
        regions: bool,

        #[command(flatten)]
        store: StoreArgs,

        #[arg(long)]
        json: bool,
    },

    /// Diff two local PNG files
    Diff {
        live: PathBuf,
        test: PathBuf,

        #[arg(long, env = "CHROMECAT_THRESHOLD", default_value_t = config::DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Write the diff image here
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Run many comparison requests from a JSON array file
    Batch {
        file: PathBuf,

        /// Browsers running at the same time
        #[arg(short, long, default_value_t = 2)]
        jobs: usize,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Copy a stored artifact to a local file
    Fetch {
        key: String,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the built-in region set as JSON
    Regions,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _ = telemetry::init_tracing();

    match args.command {
        Some(Commands::Compare {
            live,
            test,
            request,
            regions,
            threshold,
            size,
            store,
            json,
        }) => {
            let mut req = match request {
                Some(path) => serde_json::from_str::<ComparisonRequest>(&std::fs::read_to_string(&path)?)?,
                None => ComparisonRequest::new(live.unwrap_or_default(), test.unwrap_or_default()),
            };
            if !regions.is_empty() {
                req.regions = regions
                    .iter()
                    .map(|r| parse_region_arg(r))
                    .collect::<Result<_, _>>()?;
            }
            if let Some(t) = threshold {
                req.threshold = t;
            }
            if let Some(size) = size {
                req.viewport = parse_size(&size)?;
            }

            let comparator = Comparator::new(Arc::new(ChromeLauncher::new()), store.open());
            let response = comparator.compare(&req)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }

        Some(Commands::Screenshot {
            url,
            selector,
            viewport_only,
            hide,
            size,
            store,
            output,
            json,
        }) => {
            let mut req = ScreenshotRequest::new(url).full_page(!viewport_only);
            req.selector = selector;
            req.hide_selectors = hide;
            if let Some(size) = size {
                req.viewport = parse_size(&size)?;
            }

            let store = store.open();
            let response = take_screenshot(
                &ChromeLauncher::new(),
                store.as_ref(),
                PageTiming::default(),
                &req,
            )?;

            if let Some(path) = &output {
                let bytes = store
                    .get(&response.screenshot)?
                    .ok_or_else(|| format!("stored screenshot '{}' vanished", response.screenshot))?;
                std::fs::write(path, bytes)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("Stored screenshot: {}", response.screenshot);
                println!("  Size: {}x{}", response.width, response.height);
                if let Some(path) = &output {
                    println!("  Written to: {}", path.display());
                }
            }
        }

        Some(Commands::Scrape {
            url,
            size,
            regions,
            store,
            json,
        }) => {
            let mut req = ScrapeRequest::new(url);
            if let Some(size) = size {
                req.viewport = parse_size(&size)?;
            }

            let store = store.open();
            let response = take_scrape(
                &ChromeLauncher::new(),
                store.as_ref(),
                PageTiming::default(),
                &req,
            )?;

            if regions {
                println!("{}", serde_json::to_string_pretty(&response.suggested_regions())?);
            } else if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{} ({})", response.title, response.url);
                println!("  Images: {}", response.images.len());
                println!("  Sections:");
                for section in &response.sections {
                    println!("    {}", section.selector);
                }
                println!("  Screenshot: {}", response.screenshot);
            }
        }

        Some(Commands::Diff {
            live,
            test,
            threshold,
            output,
            json,
        }) => {
            let measurement = diff_png_files(&live, &test, threshold)?;
            if let Some(path) = &output {
                std::fs::write(path, measurement.diff_png()?)?;
            }
            let (width, height) = measurement.size();

            if json {
                let report = serde_json::json!({
                    "diff": measurement.percent(),
                    "status": measurement.status(),
                    "changedPixels": measurement.diff.changed_pixels,
                    "width": width,
                    "height": height,
                    "diffImage": output.as_ref().map(|p| p.display().to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: {:.2}% changed ({} of {} pixels, {}x{})",
                    measurement.status(),
                    measurement.percent(),
                    measurement.diff.changed_pixels,
                    measurement.diff.total_pixels,
                    width,
                    height
                );
                if let Some(path) = &output {
                    println!("  Diff image: {}", path.display());
                }
            }
        }

        Some(Commands::Batch { file, jobs, store }) => {
            let requests: Vec<ComparisonRequest> =
                serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let comparator = Arc::new(Comparator::new(Arc::new(ChromeLauncher::new()), store.open()));

            let runtime = tokio::runtime::Runtime::new()?;
            let items = runtime.block_on(batch::run_batch(comparator, requests, jobs));
            println!("{}", serde_json::to_string_pretty(&items)?);

            if items.iter().any(|item| !item.is_ok()) {
                return Err("one or more comparisons failed".into());
            }
        }

        Some(Commands::Fetch { key, output, store }) => {
            match store.open().get(&key)? {
                Some(bytes) => {
                    std::fs::write(&output, &bytes)?;
                    println!("Fetched {} ({} bytes) -> {}", key, bytes.len(), output.display());
                }
                None => return Err(format!("no artifact stored under '{}'", key).into()),
            }
        }

        Some(Commands::Regions) => {
            println!("{}", serde_json::to_string_pretty(&default_regions())?);
        }

        None => {
            println!("Chromecat - visual regression between a live page and its rebuild");
            println!();
            println!("Usage: chromecat <COMMAND>");
            println!();
            println!("Commands:");
            println!("  compare     Compare page regions of a live and a test URL");
            println!("  screenshot  Screenshot a page or one element");
            println!("  scrape      Scrape page content and candidate sections");
            println!("  diff        Diff two local PNG files");
            println!("  batch       Run many comparisons from a JSON file");
            println!("  fetch       Copy a stored artifact to a file");
            println!("  regions     Print the built-in region set");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn print_response(response: &ComparisonResponse) {
    for result in &response.results {
        let label = result.description.as_deref().unwrap_or(&result.name);
        match &result.error {
            Some(error) => println!("  [{}] {}: {}", result.status, label, error),
            None => println!("  [{}] {}: {:.2}%", result.status, label, result.diff),
        }
        if let Some(key) = &result.diff_image {
            println!("      diff: {}", key);
        }
    }
    if let Some(key) = &response.live_screenshot {
        println!("  live page: {}", key);
    }
    if let Some(key) = &response.test_screenshot {
        println!("  test page: {}", key);
    }
    println!();
    println!("{}", response.summary);
}

/// `NAME=SELECTOR` into a selector region
fn parse_region_arg(arg: &str) -> Result<RegionSpec, Box<dyn Error>> {
    let (name, selector) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid region '{}'. Use NAME=SELECTOR", arg))?;
    if name.trim().is_empty() || selector.trim().is_empty() {
        return Err(format!("Invalid region '{}'. Use NAME=SELECTOR", arg).into());
    }
    Ok(SelectorRegion::new(name.trim(), selector.trim()).into())
}

fn parse_size(size: &str) -> Result<chromecat::Viewport, Box<dyn Error>> {
    parse_viewport(size).ok_or_else(|| {
        format!(
            "Invalid viewport '{}'. Use: desktop, laptop, tablet, mobile, or WxH",
            size
        )
        .into()
    })
}
