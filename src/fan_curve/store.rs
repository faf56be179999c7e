use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

// Calibration curves are stored as a two line CSV file,
// the commanded percentages first and the measured RPMs second

// Read the percentages and RPMs stored at the given path
pub fn load(path: &Path) -> Result<(Vec<u8>, Vec<u32>)> {
    debug!("Loading calibration curve from: {:?}", path);

    let content = fs::read_to_string(path).with_context(|| {
        format!("Failed to read calibration curve file {path:?}")
    })?;

    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let (Some(percentages), Some(rpms)) = (lines.next(), lines.next()) else {
        return Err(anyhow!(
            "Malformed calibration curve file {path:?}: need 2 lines"
        ));
    };

    let percentages: Vec<u8> = parse_row(percentages)
        .with_context(|| "Invalid percentage row")?;
    let rpms: Vec<u32> = parse_row(rpms).with_context(|| "Invalid RPM row")?;

    if percentages.len() != rpms.len() {
        return Err(anyhow!(
            "Malformed calibration curve file {path:?}: {} percentages for {} RPMs",
            percentages.len(),
            rpms.len()
        ));
    }

    Ok((percentages, rpms))
}

// Write the curve to the given path, replacing any existing content
pub fn save(path: &Path, percentages: &[u8], rpms: &[u32]) -> Result<()> {
    info!("Writing calibration curve to {:?}", path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory {parent:?}")
            })?;
        }
    }

    let content = format!("{}\n{}\n", join_row(percentages), join_row(rpms));

    fs::write(path, content).with_context(|| {
        format!("Could not write calibration curve file {path:?}")
    })?;

    Ok(())
}

fn parse_row<T>(line: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    line.split(',')
        .map(|field| {
            let field = field.trim().trim_matches('"');
            field
                .parse::<T>()
                .with_context(|| format!("\"{field}\" is not a valid number"))
        })
        .collect()
}

fn join_row<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
