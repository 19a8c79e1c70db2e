// Save the drawing as a timestamped PNG.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::surface::Surface;

/// `smart-calculator-<unix millis>.png`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("smart-calculator-{}.png", now.timestamp_millis())
}

/// Write the surface into `dir` (created if missing) and return the path.
pub fn save_png(surface: &Surface, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    fs::write(&path, surface.encode_png()?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::GenericImageView;

    #[test]
    fn file_name_uses_millis() {
        let t = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(export_file_name(t), "smart-calculator-1700000000123.png");
    }

    #[test]
    fn writes_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");
        let surface = Surface::new(16, 8, 1.0);

        let path = save_png(&surface, &target, Utc::now()).unwrap();
        assert!(path.starts_with(&target));

        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
    }
}
