//! Line-oriented patching of the toolchain descriptor
//!
//! Both passes work the same way: the descriptor is renamed aside, streamed
//! line by line into a fresh file at the original path, and the renamed copy
//! is removed. Lines are handled as raw bytes and keep their original
//! terminators; only lines matching a substitution rule change.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::abi::select_abi;
use crate::config::PatchConfig;
use crate::error::Result;

/// State of the ABI section scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No ABI list seen yet
    Idle,
    /// Inside a `SupportedAbis` value list
    Collecting,
    /// A list has been closed; sentinels are replaced from it
    Closed,
}

/// Finite-state classifier over the descriptor's lines.
///
/// Opening a new section discards the previous list, so a sentinel is always
/// resolved against the most recently collected candidates.
#[derive(Debug)]
pub struct AbiScanner<'a> {
    markers: &'a PatchConfig,
    prefer64: bool,
    state: ScanState,
    supported: Vec<String>,
    substitutions: usize,
}

impl<'a> AbiScanner<'a> {
    pub fn new(markers: &'a PatchConfig, prefer64: bool) -> Self {
        Self {
            markers,
            prefer64,
            state: ScanState::Idle,
            supported: Vec::new(),
            substitutions: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Candidates of the current (or last closed) section
    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// Number of sentinel lines rewritten so far
    pub fn substitutions(&self) -> usize {
        self.substitutions
    }

    /// Classify one line and return what should be written for it
    pub fn feed(&mut self, line: Vec<u8>) -> Result<Vec<u8>> {
        let markers = self.markers;
        match self.state {
            ScanState::Idle => {
                if contains(&line, markers.section_marker.as_bytes()) {
                    self.open_section();
                }
                Ok(line)
            }
            ScanState::Collecting => {
                if contains(&line, markers.section_close.as_bytes()) {
                    self.state = ScanState::Closed;
                } else if let Some(abi) = abi_entry(&line) {
                    self.supported.push(String::from_utf8_lossy(abi).into_owned());
                } else {
                    debug!(
                        "Ignoring ABI list line without value: {:?}",
                        String::from_utf8_lossy(&line).trim_end()
                    );
                }
                Ok(line)
            }
            ScanState::Closed => {
                if contains(&line, markers.section_marker.as_bytes()) {
                    self.open_section();
                    Ok(line)
                } else if contains(&line, markers.abi_sentinel.as_bytes()) {
                    let abi = select_abi(&self.supported, self.prefer64)?;
                    self.substitutions += 1;
                    Ok(replace_all(
                        &line,
                        markers.abi_sentinel.as_bytes(),
                        abi.as_bytes(),
                    ))
                } else {
                    Ok(line)
                }
            }
        }
    }

    fn open_section(&mut self) {
        self.supported.clear();
        self.state = ScanState::Collecting;
    }
}

/// Text between the first `>` and the last `<` of a value line
pub fn abi_entry(line: &[u8]) -> Option<&[u8]> {
    let start = line.iter().position(|&b| b == b'>')?;
    let rest = &line[start + 1..];
    match rest.iter().rposition(|&b| b == b'<') {
        Some(end) => Some(&rest[..end]),
        None => {
            let end = rest
                .iter()
                .rposition(|&b| b != b'\r' && b != b'\n')
                .map_or(0, |i| i + 1);
            Some(&rest[..end])
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Replace every non-overlapping occurrence of `from`
fn replace_all(line: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    if from.is_empty() {
        return line.to_vec();
    }
    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(line[i]);
            i += 1;
        }
    }
    out
}

/// Applies the placeholder passes to a toolchain descriptor
#[derive(Debug, Clone, Default)]
pub struct ConfigPatcher {
    markers: PatchConfig,
}

impl ConfigPatcher {
    pub fn new(markers: PatchConfig) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &PatchConfig {
        &self.markers
    }

    /// Replace every home sentinel with `home`. Returns the number of lines changed.
    pub fn substitute_tilde(&self, toolchains: &Path, home: &Path) -> Result<usize> {
        let sentinel = self.markers.home_sentinel.as_bytes();
        let home_str = home.to_string_lossy();
        let mut changed = 0;

        rewrite_lines(toolchains, &self.markers.backup_suffix, |line| {
            if contains(&line, sentinel) {
                changed += 1;
                Ok(replace_all(&line, sentinel, home_str.as_bytes()))
            } else {
                Ok(line)
            }
        })?;

        info!(
            "Substituted all tildes with '{}' inside {}...",
            home_str,
            file_name(toolchains)
        );
        Ok(changed)
    }

    /// Replace ABI sentinels with a concrete ABI from the preceding list.
    /// Returns the number of lines changed.
    pub fn substitute_abis(&self, toolchains: &Path, prefer64: bool) -> Result<usize> {
        let mut scanner = AbiScanner::new(&self.markers, prefer64);

        rewrite_lines(toolchains, &self.markers.backup_suffix, |line| scanner.feed(line))?;

        if scanner.state() == ScanState::Collecting {
            warn!(
                "{} ends inside an unterminated ABI list",
                file_name(toolchains)
            );
        }
        info!("Substituted unchosen ABIs inside {}...", file_name(toolchains));
        Ok(scanner.substitutions())
    }
}

/// Stream `path` through `rewrite`, replacing the file.
///
/// The original is renamed to `<name><backup_suffix>` first and removed once
/// the replacement is fully written. If rewriting fails the original is put
/// back.
pub fn rewrite_lines<F>(path: &Path, backup_suffix: &str, mut rewrite: F) -> Result<()>
where
    F: FnMut(Vec<u8>) -> Result<Vec<u8>>,
{
    let backup = backup_path(path, backup_suffix);
    fs::rename(path, &backup)?;

    let result = (|| -> Result<()> {
        let mut reader = BufReader::new(File::open(&backup)?);
        let mut writer = BufWriter::new(File::create(path)?);
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let out = rewrite(std::mem::take(&mut line))?;
            writer.write_all(&out)?;
        }

        writer.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::remove_file(&backup)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(path);
            if let Err(restore) = fs::rename(&backup, path) {
                warn!(
                    "Could not restore {} from {}: {}",
                    path.display(),
                    backup.display(),
                    restore
                );
            }
            Err(e)
        }
    }
}

fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
