//! ABI selection for toolchain descriptors

use tracing::info;

use crate::error::{Error, Result};

/// Pick the first candidate matching the requested bitness.
///
/// Candidate order is significant: the first label containing `64bit`
/// (or `32bit` when `prefer64` is false) wins. A 64-bit request that finds
/// nothing falls back to 32-bit once.
pub fn select_abi<S: AsRef<str>>(candidates: &[S], prefer64: bool) -> Result<String> {
    let search_for = if prefer64 { "64bit" } else { "32bit" };

    if let Some(abi) = candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|abi| abi.contains(search_for))
    {
        return Ok(abi.to_string());
    }

    if prefer64 {
        info!("Supported ABIs do not include an ABI supporting 64bit - trying 32bit now");
        return select_abi(candidates, false);
    }

    Err(Error::NoMatchingAbi {
        candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
    })
}
