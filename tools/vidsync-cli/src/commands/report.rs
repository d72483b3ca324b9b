//! Summarise a VMAF JSON report.

use std::path::PathBuf;

use vidsync_model::report::QualityReport;

pub fn run(path: PathBuf, csv: Option<PathBuf>) -> anyhow::Result<()> {
    let report = QualityReport::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?;

    println!("VMAF Report: {}", path.display());
    println!("  Frames: {}", report.scores.len());
    if let Some(mean) = report.mean_score() {
        println!("  Mean score: {mean:.2}");
    }
    if let Some(pooled) = &report.pooled {
        println!(
            "  Pooled: min {:.2}, max {:.2}, mean {:.2}, harmonic mean {:.2}",
            pooled.min, pooled.max, pooled.mean, pooled.harmonic_mean
        );
    }
    println!();
    for count in report.bucket_counts() {
        println!(
            "  {:<16} {:>6} frames ({:.1}%)",
            count.bucket.label(),
            count.frames,
            count.percent
        );
    }

    let csv_path = csv.unwrap_or_else(|| {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vmaf".to_string());
        path.with_file_name(format!("{stem}_summary.csv"))
    });
    std::fs::write(&csv_path, report.to_csv())?;
    println!();
    println!("CSV written to {}", csv_path.display());
    Ok(())
}
