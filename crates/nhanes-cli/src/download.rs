//! ============================================================================
//! NHANES Downloads - Official CDC data files
//! ============================================================================
//! NHANES files live at
//!   https://wwwn.cdc.gov/Nchs/Data/Nhanes/Public/<year>/DataFiles/<MODULE>_<LETTER>.xpt
//! where <year> is the first year of the cycle and <LETTER> identifies the
//! cycle (E for 2007-2008 through J for 2017-2018). The site occasionally
//! rejects non-browser clients, so requests carry browser-like headers and
//! every failure falls back to printed manual-download instructions.
//! ============================================================================

use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Supported cycles and their file-name letters
pub const CYCLES: &[(&str, char)] = &[
    ("2007-2008", 'E'),
    ("2009-2010", 'F'),
    ("2011-2012", 'G'),
    ("2013-2014", 'H'),
    ("2015-2016", 'I'),
    ("2017-2018", 'J'),
];

/// Known modules and their descriptions
pub const MODULES: &[(&str, &str)] = &[
    ("DEMO", "Demographics"),
    ("EXAM", "Examination"),
    ("LAB", "Laboratory"),
    ("QUEST", "Questionnaire"),
    ("DIET", "Dietary"),
];

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const NHANES_PORTAL: &str = "https://wwwn.cdc.gov/nchs/nhanes/Default.aspx";

/// Result of one module download
#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    AlreadyPresent(PathBuf),
}

/// Letter identifying a cycle in file names
pub fn cycle_letter(cycle: &str) -> Option<char> {
    CYCLES
        .iter()
        .find(|(name, _)| *name == cycle)
        .map(|(_, letter)| *letter)
}

/// Human-readable module description
pub fn module_name(module: &str) -> &str {
    MODULES
        .iter()
        .find(|(name, _)| *name == module)
        .map(|(_, desc)| *desc)
        .unwrap_or(module)
}

pub fn is_known_module(module: &str) -> bool {
    MODULES.iter().any(|(name, _)| *name == module)
}

/// File name for a module in a cycle, e.g. `DEMO_J.xpt`
pub fn xpt_file_name(module: &str, cycle: &str) -> Option<String> {
    cycle_letter(cycle).map(|letter| format!("{}_{}.xpt", module, letter))
}

/// Candidate URLs, most likely first
pub fn candidate_urls(module: &str, cycle: &str) -> Option<Vec<String>> {
    let file_name = xpt_file_name(module, cycle)?;
    let year = cycle.split('-').next()?;
    Some(vec![
        format!(
            "https://wwwn.cdc.gov/Nchs/Data/Nhanes/Public/{}/DataFiles/{}",
            year, file_name
        ),
        format!(
            "https://wwwn.cdc.gov/Nchs/Nhanes/{}/{}",
            cycle.replace('-', "/"),
            file_name
        ),
        format!(
            "https://wwwn.cdc.gov/nchs/nhanes/{}/{}",
            cycle.replace('-', "/"),
            file_name
        ),
    ])
}

/// Download one module's .XPT into `out_dir`, trying each candidate URL
pub async fn download_module(
    client: &reqwest::Client,
    module: &str,
    cycle: &str,
    out_dir: &Path,
) -> Result<DownloadOutcome> {
    let file_name = xpt_file_name(module, cycle)
        .ok_or_else(|| anyhow!("unsupported cycle: {}", cycle))?;
    std::fs::create_dir_all(out_dir)?;
    let output = out_dir.join(&file_name);

    if output.exists() {
        return Ok(DownloadOutcome::AlreadyPresent(output));
    }

    let urls = candidate_urls(module, cycle).expect("cycle validated above");
    for (attempt, url) in urls.iter().enumerate() {
        debug!("[{}/{}] trying {}", attempt + 1, urls.len(), url);
        match fetch(client, url).await {
            Ok(bytes) if looks_like_xpt(&bytes) => {
                std::fs::write(&output, &bytes)
                    .map_err(|e| anyhow!("failed to save {}: {}", output.display(), e))?;
                return Ok(DownloadOutcome::Downloaded(output));
            }
            Ok(_) => warn!("{} returned something that is not an XPT file", url),
            Err(e) => warn!("{} failed: {}", url, e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    bail!(
        "could not download {} for cycle {} from any known URL",
        module,
        cycle
    )
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "*/*")
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Referer", NHANES_PORTAL)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| anyhow!("request failed: {}", e))?;

    if !response.status().is_success() {
        bail!("HTTP {}", response.status());
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| anyhow!("failed to read body: {}", e))?;
    Ok(bytes.to_vec())
}

/// Reject HTML error pages and suspiciously small bodies
pub fn looks_like_xpt(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"<!DOCTYPE") || bytes.starts_with(b"<html") {
        return false;
    }
    bytes.starts_with(b"HEADER RECORD") || bytes.len() >= 1000
}

/// Instructions shown when every URL fails
pub fn manual_instructions(module: &str, cycle: &str, out_dir: &Path) -> String {
    let file_name = xpt_file_name(module, cycle).unwrap_or_else(|| format!("{}_?.xpt", module));
    format!(
        "Manual download instructions:\n\
         1. Go to: {}\n\
         2. Select the cycle: {}\n\
         3. Find the module: {} ({})\n\
         4. Download the file: {}\n\
         5. Place it in: {}",
        NHANES_PORTAL,
        cycle,
        module,
        module_name(module),
        file_name,
        out_dir.display()
    )
}
