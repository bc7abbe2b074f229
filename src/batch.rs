//! Batch print orchestration: quantity expansion, column pairing and the
//! one-at-a-time job runner.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::connection::ConnectionManager;
use crate::errors::{BatchError, PrintError};
use crate::layout;
use crate::render::LabelRenderer;
use crate::spooler::{SpoolJob, Spooler};

/// One catalogue entry as posted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelItem {
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default, alias = "codigo")]
    pub code: String,
    #[serde(default, alias = "preco")]
    pub price: Value,
    #[serde(default, alias = "tamanho")]
    pub size: Option<String>,
    #[serde(default, alias = "quantidade")]
    pub quantity: Value,
    #[serde(default, alias = "valorCredito", alias = "creditValue")]
    pub credit_value: Value,
    #[serde(default, alias = "isNew", alias = "novo")]
    pub is_new: bool,
    #[serde(default, alias = "evento")]
    pub event: Option<String>,
}

/// The printable fields of one physical label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrintableItem {
    pub description: String,
    pub code: String,
    /// Raw price text; formatting happens at render time.
    pub price: Option<String>,
    pub size: Option<String>,
    pub credit_value: Option<String>,
    pub is_new: bool,
    pub event: Option<String>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_blank(text: &Option<String>) -> Option<String> {
    text.as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl From<&LabelItem> for PrintableItem {
    fn from(item: &LabelItem) -> Self {
        Self {
            description: item.description.trim().to_string(),
            code: item.code.trim().to_string(),
            price: value_text(&item.price),
            size: non_blank(&item.size),
            credit_value: non_blank(&value_text(&item.credit_value)),
            is_new: item.is_new,
            event: non_blank(&item.event),
        }
    }
}

/// Quantity policy: any positive whole amount is kept (fractions truncate,
/// numeric strings are read up to the first non-digit); zero, negatives,
/// null and anything non-numeric print a single copy.
pub fn coerce_quantity(value: &Value) -> u32 {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f.trunc() as u64)),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        }
        _ => None,
    };
    match parsed {
        Some(n) if n >= 1 => n.min(u64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

/// Repeats every item `quantity` times, keeping input order.
pub fn expand_items(items: &[LabelItem]) -> Vec<PrintableItem> {
    items
        .iter()
        .flat_map(|item| {
            let printable = PrintableItem::from(item);
            std::iter::repeat(printable).take(coerce_quantity(&item.quantity) as usize)
        })
        .collect()
}

/// One physical sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SheetJob {
    Pair {
        left: PrintableItem,
        right: PrintableItem,
    },
    Single {
        item: PrintableItem,
    },
}

impl SheetJob {
    pub fn items(&self) -> Vec<&PrintableItem> {
        match self {
            SheetJob::Pair { left, right } => vec![left, right],
            SheetJob::Single { item } => vec![item],
        }
    }

    pub fn columns(&self) -> u32 {
        match self {
            SheetJob::Pair { .. } => 2,
            SheetJob::Single { .. } => 1,
        }
    }
}

/// Groups consecutive items into two-column sheets; an odd last item gets a
/// sheet of its own.
pub fn pair_items(items: Vec<PrintableItem>) -> Vec<SheetJob> {
    let mut jobs = Vec::with_capacity((items.len() + 1) / 2);
    let mut iter = items.into_iter();
    while let Some(left) = iter.next() {
        match iter.next() {
            Some(right) => jobs.push(SheetJob::Pair { left, right }),
            None => jobs.push(SheetJob::Single { item: left }),
        }
    }
    jobs
}

/// Sends one sheet to a physical printer.
#[async_trait]
pub trait SheetPrinter: Send + Sync {
    async fn print_sheet(&self, job: &SheetJob) -> Result<(), PrintError>;

    fn target_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub jobs: usize,
}

/// Prints `jobs` strictly in order, waiting `delay` between submissions.
/// The first failure stops the batch.
pub async fn run_batch(
    jobs: &[SheetJob],
    delay: Duration,
    printer: &dyn SheetPrinter,
) -> Result<BatchSummary, BatchError> {
    let total = jobs.len();
    for (index, job) in jobs.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        info!(
            "Printing sheet {}/{} ({} column(s)) on '{}'",
            index + 1,
            total,
            job.columns(),
            printer.target_name()
        );
        if let Err(source) = printer.print_sheet(job).await {
            error!(
                "Sheet {}/{} failed on '{}': {}",
                index + 1,
                total,
                printer.target_name(),
                source
            );
            return Err(BatchError {
                failed_job: index + 1,
                completed: index,
                total,
                source,
            });
        }
    }
    Ok(BatchSummary { jobs: total })
}

/// Serial path: lays the sheet out as label elements and prints it over a
/// fresh connection.
pub struct SerialSheetPrinter {
    pub connections: Arc<ConnectionManager>,
    pub printer: String,
}

#[async_trait]
impl SheetPrinter for SerialSheetPrinter {
    async fn print_sheet(&self, job: &SheetJob) -> Result<(), PrintError> {
        let elements = layout::sheet_elements(job, Local::now().date_naive());
        let connections = self.connections.clone();
        let printer = self.printer.clone();
        tokio::task::spawn_blocking(move || connections.print_once(&printer, &elements, 1))
            .await
            .map_err(|e| PrintError::ConnectionError(format!("print task failed: {}", e)))?
    }

    fn target_name(&self) -> &str {
        &self.printer
    }
}

/// Spooler path: renders the sheet bitmap and hands it to the OS spooler.
pub struct RasterSheetPrinter {
    pub renderer: Arc<LabelRenderer>,
    pub spooler: Arc<dyn Spooler>,
    pub printer: String,
}

impl RasterSheetPrinter {
    fn printed_on() -> NaiveDate {
        Local::now().date_naive()
    }
}

#[async_trait]
impl SheetPrinter for RasterSheetPrinter {
    async fn print_sheet(&self, job: &SheetJob) -> Result<(), PrintError> {
        let renderer = self.renderer.clone();
        let sheet = job.clone();
        let image = tokio::task::spawn_blocking(move || renderer.render_sheet(&sheet, Some(Self::printed_on())))
            .await
            .map_err(|e| PrintError::RenderError(format!("render task failed: {}", e)))?;

        let job_id = self
            .spooler
            .submit(SpoolJob::for_sheet(&self.printer, image, job.columns(), 1))
            .await?;
        info!("Spooler accepted sheet as job {}", job_id);
        Ok(())
    }

    fn target_name(&self) -> &str {
        &self.printer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn item(code: &str, quantity: Value) -> LabelItem {
        LabelItem {
            description: format!("Item {}", code),
            code: code.to_string(),
            price: json!("10.00"),
            quantity,
            ..LabelItem::default()
        }
    }

    #[test]
    fn test_coerce_quantity() {
        assert_eq!(coerce_quantity(&json!(3)), 3);
        assert_eq!(coerce_quantity(&json!("4")), 4);
        assert_eq!(coerce_quantity(&json!(" 2 un")), 2);
        assert_eq!(coerce_quantity(&json!(2.9)), 2);
        assert_eq!(coerce_quantity(&json!(0)), 1);
        assert_eq!(coerce_quantity(&json!(-5)), 1);
        assert_eq!(coerce_quantity(&json!(0.5)), 1);
        assert_eq!(coerce_quantity(&json!("abc")), 1);
        assert_eq!(coerce_quantity(&Value::Null), 1);
        assert_eq!(coerce_quantity(&json!(true)), 1);
    }

    #[test]
    fn test_expand_preserves_order_and_count() {
        let items = vec![item("A", json!(2)), item("B", json!(1)), item("C", json!(3))];
        let codes: Vec<String> = expand_items(&items).into_iter().map(|i| i.code).collect();
        assert_eq!(codes, ["A", "A", "B", "C", "C", "C"]);
    }

    #[test]
    fn test_expand_copies_printable_fields() {
        let mut source = item("X1", json!("2"));
        source.size = Some(" G ".to_string());
        source.credit_value = json!(15.5);
        source.event = Some("".to_string());

        let expanded = expand_items(&[source]);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0], expanded[1]);
        assert_eq!(expanded[0].size.as_deref(), Some("G"));
        assert_eq!(expanded[0].credit_value.as_deref(), Some("15.5"));
        assert_eq!(expanded[0].event, None);
        assert_eq!(expanded[0].price.as_deref(), Some("10.00"));
    }

    #[test]
    fn test_pairing_counts() {
        for n in 0..7 {
            let items: Vec<PrintableItem> = (0..n)
                .map(|i| PrintableItem {
                    code: i.to_string(),
                    ..PrintableItem::default()
                })
                .collect();
            let jobs = pair_items(items);
            let singles = jobs
                .iter()
                .filter(|j| matches!(j, SheetJob::Single { .. }))
                .count();
            assert_eq!(jobs.len(), (n + 1) / 2);
            assert_eq!(singles, n % 2);
        }
    }

    #[test]
    fn test_pairing_keeps_order_and_trailing_single() {
        let items = vec![item("A", json!(1)), item("B", json!(1)), item("C", json!(1))];
        let jobs = pair_items(expand_items(&items));
        let layout: Vec<Vec<&str>> = jobs
            .iter()
            .map(|j| j.items().iter().map(|i| i.code.as_str()).collect())
            .collect();
        assert_eq!(layout, vec![vec!["A", "B"], vec!["C"]]);
        assert_eq!(jobs[1].columns(), 1);
    }

    #[test]
    fn test_quantities_two_one_one_make_two_pairs() {
        let items = vec![item("A", json!(2)), item("B", json!(1)), item("C", json!(1))];
        let expanded = expand_items(&items);
        assert_eq!(expanded.len(), 4);

        let jobs = pair_items(expanded);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| matches!(j, SheetJob::Pair { .. })));
    }

    #[test]
    fn test_item_accepts_portuguese_field_names() {
        let body = json!({
            "descricao": "Vestido floral",
            "codigo": "VF-001",
            "preco": 89.9,
            "tamanho": "M",
            "quantidade": "2"
        });
        let parsed: LabelItem = serde_json::from_value(body).expect("valid item");
        let printable = PrintableItem::from(&parsed);
        assert_eq!(printable.code, "VF-001");
        assert_eq!(printable.price.as_deref(), Some("89.9"));
        assert_eq!(coerce_quantity(&parsed.quantity), 2);
    }

    struct RecordingPrinter {
        printed: Mutex<Vec<Vec<String>>>,
        fail_on: Option<usize>,
    }

    impl RecordingPrinter {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                printed: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl SheetPrinter for RecordingPrinter {
        async fn print_sheet(&self, job: &SheetJob) -> Result<(), PrintError> {
            let mut printed = self.printed.lock().unwrap();
            if Some(printed.len() + 1) == self.fail_on {
                return Err(PrintError::ConnectionError("paper out".to_string()));
            }
            printed.push(job.items().iter().map(|i| i.code.clone()).collect());
            Ok(())
        }

        fn target_name(&self) -> &str {
            "recorder"
        }
    }

    fn five_items() -> Vec<SheetJob> {
        let items: Vec<LabelItem> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|c| item(c, json!(1)))
            .collect();
        pair_items(expand_items(&items))
    }

    #[tokio::test]
    async fn test_run_batch_prints_in_order() {
        let printer = RecordingPrinter::new(None);
        let summary = run_batch(&five_items(), Duration::ZERO, &printer)
            .await
            .expect("batch");

        assert_eq!(summary.jobs, 3);
        assert_eq!(
            *printer.printed.lock().unwrap(),
            vec![vec!["A", "B"], vec!["C", "D"], vec!["E"]]
        );
    }

    #[tokio::test]
    async fn test_run_batch_stops_at_first_failure() {
        let printer = RecordingPrinter::new(Some(2));
        let err = run_batch(&five_items(), Duration::ZERO, &printer)
            .await
            .expect_err("second sheet fails");

        assert_eq!(err.failed_job, 2);
        assert_eq!(err.completed, 1);
        assert_eq!(err.total, 3);
        assert_eq!(printer.printed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_batch_waits_between_jobs() {
        let printer = RecordingPrinter::new(None);
        let started = std::time::Instant::now();
        run_batch(&five_items(), Duration::from_millis(20), &printer)
            .await
            .expect("batch");
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
