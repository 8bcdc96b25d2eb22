//! Command line front end: one subcommand per EFMI product plus download helpers.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use efmi_regrid::io::archive::is_zip_content;
use efmi_regrid::io::download::{check_files, DownloadParams, DownloadRequest, Downloader, HdaCredentials};
use efmi_regrid::io::geotiff::GeoTiffReader;
use efmi_regrid::io::{NetCdfReader, RedownloadQueue};
use efmi_regrid::products::{agb, change_tcd, disturbance, fires, lai, lst, projection, soil_carbon};
use efmi_regrid::{GridError, GridResult, RegridConfig, RunSummary};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "efmi")]
#[command(about = "Regrid and subset Earth-observation datasets to the EURO-CORDEX domain")]
struct Args {
    /// JSON configuration file (domain, radius, version, directories)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monthly leaf area index from CLMS 10-daily composites
    Lai {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Monthly burned-area masks from the C3S OLCI product
    Fires {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Annual carbon stock from ESA-CCI biomass
    Agb {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Monthly land surface temperature from ESA-CCI LST day and night files
    Lst {
        /// LST tree, relative to the input root unless absolute
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Monthly soil organic carbon from SMAP L4 daily files
    SoilCarbon {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Tree cover density change against the base year
    ChangeTcd {
        #[arg(long, default_value_t = 2012)]
        base_year: i32,
        #[arg(long, value_delimiter = ',', default_values_t = vec![2015, 2018])]
        years: Vec<i32>,
        /// Unpack the downloaded ZIP archives first
        #[arg(long)]
        extract: bool,
    },
    /// Disturbance polygons with areas (forwind or defid2)
    Disturbance {
        #[arg(long)]
        source: disturbance::DisturbanceSource,
        /// Database file, defaults to the location under the input root
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Bilinear regrid of a EURO-CORDEX projection onto a reference grid
    Projection {
        /// Model output chunks, concatenated along time
        #[arg(long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
        /// File providing the target `lat`/`lon` axes
        #[arg(long)]
        target_grid: PathBuf,
        #[arg(long)]
        variable: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        scenario: String,
        /// Source is on plain lat/lon axes instead of a rotated pole
        #[arg(long)]
        geographic: bool,
    },
    /// Scan downloaded files and list the ones that no longer open
    Check {
        files: Vec<PathBuf>,
        /// Delete the corrupt files
        #[arg(long)]
        purge: bool,
    },
    /// Download a URL list sequentially
    Fetch {
        /// One `url [file_name]` per line
        #[arg(long)]
        urls: PathBuf,
        #[arg(long)]
        dest: PathBuf,
        /// Credentials file, defaults to ~/.hdarc
        #[arg(long)]
        credentials: Option<PathBuf>,
        /// Skip basic authentication
        #[arg(long)]
        anonymous: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let config = match &args.config {
        Some(path) => RegridConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => RegridConfig::default(),
    };

    let summary = run_command(&config, args.command)?;
    if let Some(summary) = summary {
        report(&summary);
    }
    Ok(())
}

fn run_command(config: &RegridConfig, command: Command) -> Result<Option<RunSummary>> {
    let summary = match command {
        Command::Lai { start, end } => {
            let mut params = lai::LaiParams::default();
            override_range(&mut params.start, &mut params.end, start, end);
            lai::run(config, &params).context("LAI processing failed")?
        }
        Command::Fires { start, end } => {
            let mut params = fires::FiresParams::default();
            override_range(&mut params.start, &mut params.end, start, end);
            fires::run(config, &params).context("Burned area processing failed")?
        }
        Command::Agb { start, end } => {
            let mut params = agb::AgbParams::default();
            override_range(&mut params.start, &mut params.end, start, end);
            agb::run(config, &params).context("Biomass processing failed")?
        }
        Command::Lst { input_dir, start, end } => {
            let mut params = lst::LstParams::default();
            if let Some(dir) = input_dir {
                params.input_dir = dir;
            }
            override_range(&mut params.start, &mut params.end, start, end);
            lst::run(config, &params).context("LST processing failed")?
        }
        Command::SoilCarbon { start, end } => {
            let mut params = soil_carbon::SoilCarbonParams::default();
            override_range(&mut params.start, &mut params.end, start, end);
            soil_carbon::run(config, &params).context("Soil carbon processing failed")?
        }
        Command::ChangeTcd { base_year, years, extract } => {
            let params = change_tcd::ChangeTcdParams {
                base_year,
                years,
                extract_archives: extract,
                ..Default::default()
            };
            change_tcd::run(config, &params).context("Tree cover density processing failed")?
        }
        Command::Disturbance { source, input } => {
            let params = disturbance::DisturbanceParams { source, input };
            disturbance::run(config, &params).context("Disturbance processing failed")?
        }
        Command::Projection { input, target_grid, variable, model, scenario, geographic } => {
            let mut params = projection::ProjectionParams::new(input, target_grid, &variable, &model, &scenario);
            if geographic {
                params.source_grid = projection::SourceGrid::Geographic { lat: "lat".to_string(), lon: "lon".to_string() };
            }
            projection::run(config, &params).context("Projection regridding failed")?
        }
        Command::Check { files, purge } => {
            let queue = check_files(&files, verify_readable, purge || config.purge_corrupt);
            persist_check_list(config, &queue)?;
            log::info!("{} of {} files need another download", queue.len(), files.len());
            return Ok(None);
        }
        Command::Fetch { urls, dest, credentials, anonymous } => {
            fetch(&urls, &dest, credentials, anonymous)?;
            return Ok(None);
        }
    };
    Ok(Some(summary))
}

fn override_range(start: &mut NaiveDate, end: &mut NaiveDate, new_start: Option<NaiveDate>, new_end: Option<NaiveDate>) {
    if let Some(s) = new_start {
        *start = s;
    }
    if let Some(e) = new_end {
        *end = e;
    }
}

/// Open a downloaded file with the reader matching its extension
fn verify_readable(path: &Path) -> GridResult<()> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("nc") | Some("h5") => NetCdfReader::verify_readable(path),
        Some("tif") | Some("tiff") => GeoTiffReader::read(path, &[]).map(|_| ()),
        Some("zip") => {
            let mut head = [0u8; 4];
            let mut file = std::fs::File::open(path)?;
            std::io::Read::read_exact(&mut file, &mut head)?;
            if is_zip_content(&head) {
                Ok(())
            } else {
                Err(GridError::InvalidFormat(format!("{} is not a ZIP archive", path.display())))
            }
        }
        _ => {
            log::debug!("No reader for {}, checking it is non-empty", path.display());
            if std::fs::metadata(path)?.len() == 0 {
                return Err(GridError::InvalidFormat(format!("{} is empty", path.display())));
            }
            Ok(())
        }
    }
}

fn persist_check_list(config: &RegridConfig, queue: &RedownloadQueue) -> Result<()> {
    if queue.is_empty() || !config.write_redownload_list {
        return Ok(());
    }
    std::fs::create_dir_all(&config.output_dir)?;
    let list = config.output_dir.join("redownload_check.txt");
    queue.persist(&list)?;
    log::info!("Redownload list written to {}", list.display());
    Ok(())
}

fn fetch(urls: &Path, dest: &Path, credentials: Option<PathBuf>, anonymous: bool) -> Result<()> {
    let content = std::fs::read_to_string(urls).with_context(|| format!("Cannot read {}", urls.display()))?;
    let requests = DownloadRequest::parse_list(&content)?;

    let credentials = if anonymous {
        None
    } else {
        let path = match credentials {
            Some(path) => path,
            None => HdaCredentials::default_path()?,
        };
        Some(HdaCredentials::from_path(&path)?)
    };

    let downloader = Downloader::new(DownloadParams::default(), credentials)?;
    let mut queue = RedownloadQueue::new();
    let fetched = downloader.fetch_all(&requests, dest, verify_readable, &mut queue)?;
    log::info!("Downloaded {} of {} files", fetched.len(), requests.len());

    if !queue.is_empty() {
        let list = dest.join("redownload.txt");
        queue.persist(&list)?;
        log::warn!("{} downloads failed, listed in {}", queue.len(), list.display());
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    for output in &summary.outputs {
        log::info!("Output: {}", output.display());
    }
    log::info!("{} time steps", summary.time_steps);
    if !summary.missing_dates.is_empty() {
        log::warn!("{} expected input dates were missing", summary.missing_dates.len());
    }
    if !summary.redownload.is_empty() {
        log::warn!("{} files need another download", summary.redownload.len());
    }
}
