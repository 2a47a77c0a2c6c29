//! Capture sources.
//!
//! The listener does not capture packets itself; it drives an external
//! capture tool through [`CaptureSource`]. The stock source runs `tshark`
//! with a capture filter for the engine's UDP port and reads one field line
//! per frame from its stdout.

use crate::capture::CaptureError;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use tracing::{debug, info};

/// What to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub source_path: PathBuf,
    pub interface: String,
    pub port: u16,
}

impl CaptureRequest {
    /// Check the inputs before anything is spawned.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.interface.trim().is_empty() {
            return Err(CaptureError::EmptyInterface);
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(CaptureError::EmptySourcePath);
        }
        if !self.source_path.exists() {
            return Err(CaptureError::SourceMissing {
                path: self.source_path.display().to_string(),
            });
        }
        Ok(())
    }

    /// BPF filter restricting capture to the engine's traffic.
    pub fn capture_filter(&self) -> String {
        format!("udp port {}", self.port)
    }
}

/// Opens a stream of frames.
pub trait CaptureSource: Send + Sync {
    /// Attach to the interface. Blocks until capture is running or has
    /// failed.
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn FrameStream>, CaptureError>;
}

/// Frames from an open capture, one field line each.
pub trait FrameStream: Send {
    /// Next frame line; `Ok(None)` once the source has ended. May block.
    fn next_line(&mut self) -> Result<Option<String>, CaptureError>;

    /// Release the source.
    fn close(&mut self);
}

/// Runs `tshark` as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsharkSource;

impl TsharkSource {
    fn command(request: &CaptureRequest) -> Command {
        let mut command = Command::new(&request.source_path);
        command
            .args(["-i", request.interface.as_str()])
            .args(["-l", "-n"])
            .args(["-f", request.capture_filter().as_str()])
            .args(["-T", "fields", "-E", "separator=/t"])
            .args(["-e", "ip.src", "-e", "ip.dst", "-e", "frame.len", "-e", "udp.payload"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl CaptureSource for TsharkSource {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn FrameStream>, CaptureError> {
        let mut child = Self::command(request).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CaptureError::SourceNotFound {
                    path: request.source_path.display().to_string(),
                    detail: e.to_string(),
                }
            } else {
                CaptureError::InitFailed(e.to_string())
            }
        })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::InitFailed(
                    "capture process pipes unavailable".to_string(),
                ));
            }
        };

        // tshark announces "Capturing on '<iface>'" on stderr once live; any
        // earlier end of stderr means it gave up.
        let mut stderr = BufReader::new(stderr);
        let mut diagnostics = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            match stderr.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = child.wait();
                    return Err(classify_init_failure(request, diagnostics.trim()));
                }
                Ok(_) => {
                    if line.contains("Capturing on") {
                        info!(interface = %request.interface, filter = %request.capture_filter(), "capture live");
                        break;
                    }
                    diagnostics.push_str(&line);
                }
            }
        }

        // Keep stderr drained so tshark never blocks on it.
        thread::spawn(move || {
            let mut sink = Vec::new();
            let _ = stderr.read_to_end(&mut sink);
        });

        Ok(Box::new(TsharkStream {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

struct TsharkStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl FrameStream for TsharkStream {
    fn next_line(&mut self) -> Result<Option<String>, CaptureError> {
        self.lines
            .next()
            .transpose()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }

    fn close(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("capture process closed");
    }
}

impl Drop for TsharkStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a failed start to a source or interface problem from the tool's
/// diagnostics.
pub fn classify_init_failure(request: &CaptureRequest, diagnostics: &str) -> CaptureError {
    let lower = diagnostics.to_lowercase();
    if lower.contains("interface")
        || lower.contains("does not exist")
        || lower.contains("no such device")
    {
        CaptureError::InterfaceNotFound {
            interface: request.interface.clone(),
            detail: diagnostics.to_string(),
        }
    } else if lower.contains("tshark") && lower.contains("not found") {
        CaptureError::SourceNotFound {
            path: request.source_path.display().to_string(),
            detail: diagnostics.to_string(),
        }
    } else if diagnostics.is_empty() {
        CaptureError::InitFailed("capture process exited before capturing".to_string())
    } else {
        CaptureError::InitFailed(diagnostics.to_string())
    }
}

/// Well-known tshark install locations, checked before `PATH`.
const COMMON_SOURCE_PATHS: &[&str] = &[
    "/usr/bin/tshark",
    "/usr/local/bin/tshark",
    "/opt/homebrew/bin/tshark",
    "/Applications/Wireshark.app/Contents/MacOS/tshark",
    r"C:\Program Files\Wireshark\tshark.exe",
    r"C:\Program Files (x86)\Wireshark\tshark.exe",
];

/// Locate a tshark executable.
pub fn find_capture_source() -> Option<PathBuf> {
    if let Some(found) = COMMON_SOURCE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
    {
        return Some(found);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| [dir.join("tshark"), dir.join("tshark.exe")])
        .find(|candidate| candidate.is_file())
}

/// Ask the tool for its capture interfaces (`tshark -D`).
pub fn list_interfaces(source_path: &Path) -> Result<Vec<String>, CaptureError> {
    if !source_path.exists() {
        return Err(CaptureError::SourceMissing {
            path: source_path.display().to_string(),
        });
    }

    let output = Command::new(source_path)
        .arg("-D")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CaptureError::SourceNotFound {
            path: source_path.display().to_string(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CaptureError::InitFailed(format!(
            "failed to list interfaces: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_interface_listing(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `-D` output (`1. eth0 (Ethernet)`) into interface names.
pub fn parse_interface_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let (number, rest) = line.trim().split_once(". ")?;
            number.parse::<u32>().ok()?;
            let name = match rest.rfind(" (") {
                Some(idx) if rest.ends_with(')') => &rest[..idx],
                _ => rest,
            };
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
