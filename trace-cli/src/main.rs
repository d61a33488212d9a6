use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use image_core::{Asid, Image, ReadKind};

mod config;
mod logger;

use config::Config;

/// Assembles a traced image from `--raw`/`--elf` arguments and walks it,
/// in the spirit of `ptxed`: rather than decoding a real Intel PT trace,
/// `--read` stands in for the decoder, issuing one byte fetch per address.
#[derive(Parser, Debug)]
#[command(name = "trace-cli", about)]
struct Cli {
    /// Load a whole file as one section: `file[:base]` (default base 0).
    #[arg(long = "raw", value_name = "FILE[:BASE]")]
    raw: Vec<String>,

    /// Load an ELF object's PT_LOAD segments: `file[:base]` (default base 0).
    #[arg(long = "elf", value_name = "FILE[:BASE]")]
    elf: Vec<String>,

    /// Fetch bytes at an address: `addr[:len]` (default len 16). Repeatable;
    /// stands in for the instructions a real decoder would walk.
    #[arg(long = "read", value_name = "ADDR[:LEN]")]
    read: Vec<String>,

    /// Override the image's cache bound `C` (default from config, itself
    /// defaulting to 10).
    #[arg(long)]
    cache: Option<u32>,

    /// Log every section load at `info`, mirroring the original driver's
    /// section-load tracing.
    #[arg(long = "track-image")]
    track_image: bool,

    /// Accumulate hot/cold/callback/miss counters instead of printing each
    /// read's bytes.
    #[arg(long)]
    stat: bool,

    /// Suppress per-read output (stats, if requested, still print).
    #[arg(long)]
    quiet: bool,

    /// Echo logs to the console at `info` and above.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Path to a TOML config file; falls back to built-in defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Restrict section loads and reads to this ASID's CR3 value (hex
    /// `0x...` or decimal). Omitted keys act as a wildcard; see `Asid`.
    #[arg(long, value_name = "CR3")]
    cr3: Option<String>,

    /// Restrict section loads and reads to this ASID's VMCS pointer (hex
    /// `0x...` or decimal).
    #[arg(long, value_name = "VMCS")]
    vmcs: Option<String>,
}

/// One `--read addr[:len]` request, decoded up front so a malformed
/// argument is reported before any image work starts.
struct ReadRequest {
    addr: u64,
    len: usize,
}

const DEFAULT_READ_LEN: usize = 16;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Keep the handle alive for the duration of the process; dropping it
    // early can stop the logger.
    let _logger = match logger::init_logger(&config.log_level, &config.log_dir, cli.verbose) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("failed to initialize logger: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let reads = cli
        .read
        .iter()
        .map(|arg| parse_read_request(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut image = Image::new(None);
    image.set_cache_limit(cli.cache.unwrap_or(config.cache_limit));

    // `--cr3`/`--vmcs` are the user-supplied ASID this run is scoped to;
    // canonicalize them once at the entry point, same as the image does
    // for any ASID it's handed.
    let cr3 = parse_optional_u64(cli.cr3.as_deref(), "--cr3")?;
    let vmcs = parse_optional_u64(cli.vmcs.as_deref(), "--vmcs")?;
    let user_asid = (cr3.is_some() || vmcs.is_some()).then(|| Asid::new(cr3, vmcs));
    let asid = Asid::from_user(user_asid.as_ref());

    for arg in &cli.raw {
        image_loaders::raw::load_raw(&mut image, arg, asid)?;
        info!("raw: loaded {arg}");
    }
    for arg in &cli.elf {
        image_loaders::elf::load_elf(&mut image, arg, asid, cli.track_image)?;
    }

    if image.is_empty() {
        warn!("no --raw/--elf sections were loaded; every read will report NoMap");
    }

    let mut stats = Stats::default();
    for req in &reads {
        let mut buf = vec![0u8; req.len];
        match image.read_traced(&mut buf, &asid, req.addr) {
            Ok((n, kind)) => {
                stats.record(kind);
                if !cli.stat && !cli.quiet {
                    print_hexdump(req.addr, &buf[..n]);
                }
            }
            Err(image_core::ImageError::NoMap) => {
                stats.nomap += 1;
                if !cli.stat && !cli.quiet {
                    println!("{:#018x}: <no mapping>", req.addr);
                }
            }
            Err(e) => return Err(Box::new(e)),
        }
    }

    if cli.stat {
        println!(
            "reads: {} hot, {} cold, {} via callback, {} nomap ({} evictions, cache={})",
            stats.hot,
            stats.cold,
            stats.callback,
            stats.nomap,
            image.evictions(),
            image.cache_limit(),
        );
    }

    Ok(())
}

#[derive(Default)]
struct Stats {
    hot: u64,
    cold: u64,
    callback: u64,
    nomap: u64,
}

impl Stats {
    fn record(&mut self, kind: ReadKind) {
        match kind {
            ReadKind::Hot => self.hot += 1,
            ReadKind::Cold => self.cold += 1,
            ReadKind::Callback => self.callback += 1,
        }
    }
}

/// Parse `addr[:len]`, where `addr` and `len` each accept `0x`-prefixed hex
/// or plain decimal, matching the loaders' `path:base` shorthand.
fn parse_read_request(arg: &str) -> Result<ReadRequest, String> {
    let (addr_str, len_str) = match arg.rsplit_once(':') {
        Some((a, l)) => (a, Some(l)),
        None => (arg, None),
    };

    let addr = parse_u64(addr_str).ok_or_else(|| format!("--read: bad address `{addr_str}`"))?;
    let len = match len_str {
        Some(l) => parse_u64(l).ok_or_else(|| format!("--read: bad length `{l}`"))? as usize,
        None => DEFAULT_READ_LEN,
    };
    if len == 0 {
        return Err("--read: length must be nonzero".to_owned());
    }

    Ok(ReadRequest { addr, len })
}

fn parse_u64(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn parse_optional_u64(s: Option<&str>, flag: &str) -> Result<Option<u64>, String> {
    match s {
        Some(v) => parse_u64(v).map(Some).ok_or_else(|| format!("{flag}: bad value `{v}`")),
        None => Ok(None),
    }
}

fn print_hexdump(addr: u64, bytes: &[u8]) {
    let mut line = format!("{addr:#018x}:");
    for b in bytes {
        line.push_str(&format!(" {b:02x}"));
    }
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_read_request_defaults_length() {
        let req = parse_read_request("0x1000").unwrap();
        assert_eq!(req.addr, 0x1000);
        assert_eq!(req.len, DEFAULT_READ_LEN);
    }

    #[test]
    fn parse_read_request_accepts_explicit_length() {
        let req = parse_read_request("4096:8").unwrap();
        assert_eq!(req.addr, 4096);
        assert_eq!(req.len, 8);
    }

    #[test]
    fn parse_read_request_rejects_zero_length() {
        assert!(parse_read_request("0x1000:0").is_err());
    }

    #[test]
    fn parse_optional_u64_absent_is_none() {
        assert_eq!(parse_optional_u64(None, "--cr3").unwrap(), None);
    }

    #[test]
    fn parse_optional_u64_parses_hex_and_decimal() {
        assert_eq!(parse_optional_u64(Some("0x10"), "--cr3").unwrap(), Some(0x10));
        assert_eq!(parse_optional_u64(Some("16"), "--cr3").unwrap(), Some(16));
    }

    #[test]
    fn parse_optional_u64_rejects_garbage() {
        let err = parse_optional_u64(Some("nope"), "--cr3").unwrap_err();
        assert!(err.contains("--cr3"));
    }
}
