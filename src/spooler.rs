// OS print spooler boundary for raster labels

use async_trait::async_trait;
use image::RgbImage;
#[cfg(feature = "printer-cups")]
use printers::{common::base::job::PrinterJobOptions, get_printers};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::PrintError;
use crate::render::{self, sheet_size_mm, RENDER_DPI};

/// A printer as reported by the OS spooler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemPrinter {
    pub name: String,
    pub system_name: String,
    pub uri: String,
}

impl SystemPrinter {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.system_name == name
    }
}

#[derive(Debug)]
pub struct SpoolJob {
    pub printer: String,
    pub image: RgbImage,
    pub width_mm: f32,
    pub height_mm: f32,
    pub copies: u32,
    pub document_name: String,
}

impl SpoolJob {
    pub fn for_sheet(printer: &str, image: RgbImage, columns: u32, copies: u32) -> Self {
        let (width_mm, height_mm) = sheet_size_mm(columns);
        Self {
            printer: printer.to_string(),
            image,
            width_mm,
            height_mm,
            copies,
            document_name: format!("Etiqueta-{}", chrono::Local::now().format("%Y%m%d-%H%M%S")),
        }
    }
}

/// Job options for a borderless, gray, fixed-resolution label page.
pub fn job_options(job: &SpoolJob) -> Vec<(&'static str, String)> {
    vec![
        (
            "PageSize",
            format!("Custom.{}x{}mm", job.width_mm, job.height_mm),
        ),
        ("ColorModel", "Gray".to_string()),
        ("print-color-mode", "monochrome".to_string()),
        ("Resolution", format!("{}dpi", RENDER_DPI)),
        ("ppi", RENDER_DPI.to_string()),
        ("scaling", "100".to_string()),
        ("page-left", "0".to_string()),
        ("page-right", "0".to_string()),
        ("page-top", "0".to_string()),
        ("page-bottom", "0".to_string()),
        ("copies", job.copies.to_string()),
        ("job-name", job.document_name.clone()),
    ]
}

#[async_trait]
pub trait Spooler: Send + Sync {
    async fn list_printers(&self) -> Vec<SystemPrinter>;

    /// Hands the job to the spooler and returns its job id. Acceptance does
    /// not mean the label physically printed.
    async fn submit(&self, job: SpoolJob) -> Result<String, PrintError>;

    fn type_name(&self) -> &'static str;
}

#[cfg(unix)]
fn make_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(mut perms) = std::fs::metadata(path).map(|m| m.permissions()) {
        perms.set_mode(0o644);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn make_readable(_path: &Path) {}

#[cfg(feature = "printer-cups")]
pub struct SystemSpooler {
    spool_dir: PathBuf,
    timeout: Duration,
    grace: Duration,
}

#[cfg(feature = "printer-cups")]
impl SystemSpooler {
    pub fn new(spool_dir: PathBuf, timeout: Duration, grace: Duration) -> Self {
        Self {
            spool_dir,
            timeout,
            grace,
        }
    }

    fn schedule_cleanup(&self, path: PathBuf) {
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove spooled file {}: {}", path.display(), e);
            }
        });
    }

    fn spool_blocking(
        image: RgbImage,
        file: &Path,
        printer_name: &str,
        options: Vec<(&'static str, String)>,
        document_name: &str,
    ) -> Result<u64, PrintError> {
        render::save_png(&image, file)?;
        make_readable(file);

        let printer = get_printers()
            .into_iter()
            .find(|p| p.name == printer_name || p.system_name == printer_name)
            .ok_or_else(|| PrintError::NotFound {
                name: printer_name.to_string(),
            })?;

        let raw_props: Vec<(&str, &str)> = options.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let job_options = PrinterJobOptions {
            name: Some(document_name),
            raw_properties: &raw_props,
        };
        printer
            .print_file(&file.to_string_lossy(), job_options)
            .map_err(|e| PrintError::RenderError(format!("spooler rejected job: {}", e)))
    }
}

#[cfg(feature = "printer-cups")]
#[async_trait]
impl Spooler for SystemSpooler {
    async fn list_printers(&self) -> Vec<SystemPrinter> {
        match tokio::task::spawn_blocking(get_printers).await {
            Ok(found) => found
                .into_iter()
                .map(|p| SystemPrinter {
                    name: p.name,
                    system_name: p.system_name,
                    uri: p.uri,
                })
                .collect(),
            Err(e) => {
                warn!("Printer discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn submit(&self, job: SpoolJob) -> Result<String, PrintError> {
        tokio::fs::create_dir_all(&self.spool_dir).await.map_err(|e| {
            PrintError::RenderError(format!(
                "cannot create spool directory {}: {}",
                self.spool_dir.display(),
                e
            ))
        })?;
        let path = self
            .spool_dir
            .join(format!("label-{}.png", uuid::Uuid::new_v4()));

        info!(
            "Spooling {}x{} mm sheet to '{}' ({} copies)",
            job.width_mm, job.height_mm, job.printer, job.copies
        );
        let options = job_options(&job);
        let file = path.clone();
        let task = tokio::task::spawn_blocking(move || {
            Self::spool_blocking(job.image, &file, &job.printer, options, &job.document_name)
        });

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PrintError::RenderError(format!("spool task failed: {}", e))),
            Err(_) => Err(PrintError::RenderError(format!(
                "spooler did not respond within {}s",
                self.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(job_id) => {
                info!("Spooler accepted job {}", job_id);
                self.schedule_cleanup(path);
                Ok(job_id.to_string())
            }
            Err(e) => {
                warn!("Spooling failed: {}", e);
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", path.display(), remove);
                    }
                }
                Err(e)
            }
        }
    }

    fn type_name(&self) -> &'static str {
        "System spooler"
    }
}

/// A job seen by [`MockSpooler`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpooledJob {
    pub printer: String,
    pub width_px: u32,
    pub height_px: u32,
    pub width_mm: f32,
    pub height_mm: f32,
    pub copies: u32,
}

/// In-memory spooler for tests or when no real spooler is available.
#[derive(Debug, Default)]
pub struct MockSpooler {
    printers: Vec<String>,
    jobs: Mutex<Vec<SpooledJob>>,
    /// 1-based submission that starts failing.
    fail_from: Option<usize>,
}

impl MockSpooler {
    pub fn new(printers: Vec<String>) -> Self {
        Self {
            printers,
            ..Self::default()
        }
    }

    pub fn failing_from(mut self, submission: usize) -> Self {
        self.fail_from = Some(submission);
        self
    }

    pub fn jobs(&self) -> Vec<SpooledJob> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Spooler for MockSpooler {
    async fn list_printers(&self) -> Vec<SystemPrinter> {
        self.printers
            .iter()
            .map(|name| SystemPrinter {
                name: name.clone(),
                system_name: name.clone(),
                uri: format!("mock://{}", name),
            })
            .collect()
    }

    async fn submit(&self, job: SpoolJob) -> Result<String, PrintError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let submission = jobs.len() + 1;
        if self.fail_from.is_some_and(|n| submission >= n) {
            return Err(PrintError::RenderError("mock spooler offline".to_string()));
        }
        jobs.push(SpooledJob {
            printer: job.printer,
            width_px: job.image.width(),
            height_px: job.image.height(),
            width_mm: job.width_mm,
            height_mm: job.height_mm,
            copies: job.copies,
        });
        Ok(format!("mock-job-{}", submission))
    }

    fn type_name(&self) -> &'static str {
        "Mock spooler"
    }
}

/// Picks the spooler for this build and configuration.
pub fn new_spooler(config: &Config) -> Arc<dyn Spooler> {
    #[cfg(feature = "printer-cups")]
    {
        if !config.printing.use_mock_printer {
            info!("Using system print spooler");
            return Arc::new(SystemSpooler::new(
                config.storage.spool_dir(),
                config.printing.spooler_timeout(),
                config.printing.spooler_grace(),
            ));
        }
    }

    warn!("Using mock spooler, raster labels will not reach a printer");
    let printers = config.printing.default_printer.iter().cloned().collect();
    Arc::new(MockSpooler::new(printers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(columns: u32) -> SpoolJob {
        let image = RgbImage::new(320 * columns, 480);
        SpoolJob::for_sheet("Elgin L42", image, columns, 1)
    }

    #[test]
    fn test_job_options_describe_label_page() {
        let options = job_options(&job(2));
        let get = |key: &str| {
            options
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("PageSize"), Some("Custom.80x60mm"));
        assert_eq!(get("ColorModel"), Some("Gray"));
        assert_eq!(get("Resolution"), Some("203dpi"));
        assert_eq!(get("page-top"), Some("0"));
        assert_eq!(get("copies"), Some("1"));
        assert!(get("job-name").is_some_and(|n| n.starts_with("Etiqueta-")));
    }

    #[tokio::test]
    async fn test_mock_spooler_records_jobs() {
        let spooler = MockSpooler::new(vec!["Elgin L42".to_string()]);
        let id = spooler.submit(job(1)).await.expect("submitted");

        assert_eq!(id, "mock-job-1");
        let jobs = spooler.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!((jobs[0].width_px, jobs[0].height_px), (320, 480));
        assert_eq!((jobs[0].width_mm, jobs[0].height_mm), (40.0, 60.0));
        assert!(spooler.list_printers().await[0].matches("Elgin L42"));
    }

    #[tokio::test]
    async fn test_mock_spooler_failure() {
        let spooler = MockSpooler::default().failing_from(2);
        assert!(spooler.submit(job(2)).await.is_ok());
        assert!(matches!(
            spooler.submit(job(2)).await,
            Err(PrintError::RenderError(_))
        ));
        assert_eq!(spooler.jobs().len(), 1);
    }
}
