//! End-to-end run: source → filter → acquire → assemble → sink → artifact.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tenderflow_artifacts::{RunArtifacts, write_run_artifacts};
use tenderflow_bundle::{AcquireSettings, Acquirer, Acquisition, LandingZone};
use tenderflow_extract::Extractor;
use tenderflow_shared::{
    AppConfig, EmittedRecord, Result, Tender, TenderRecord, TenderStatus, TenderflowError,
};
use tenderflow_source::TenderSource;

use crate::archive::{BundleArchiver, DirectoryArchiver, NoArchive};
use crate::assembler::{Assembler, RecordAssembler};
use crate::filter::SubjectFilter;
use crate::sink::{RecordSink, sink_from_config};

/// Driver settings not owned by a component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of every landing zone; removed at the end of a run when empty.
    pub landing_root: PathBuf,
    pub summary_path: PathBuf,
    pub write_json: bool,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
}

impl PipelineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            landing_root: PathBuf::from(&config.download.landing_root),
            summary_path: PathBuf::from(&config.output.summary_path),
            write_json: config.output.write_json,
            connect_attempts: config.source.connect_attempts.max(1),
            connect_backoff: Duration::from_secs(config.source.connect_backoff_secs),
        }
    }
}

/// A tender that left the run without a record.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedTender {
    pub reference: String,
    pub error: String,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub listed: usize,
    pub filtered_out: usize,
    /// Accumulated records, in processing order.
    pub records: Vec<EmittedRecord>,
    pub dropped: Vec<DroppedTender>,
    pub sink_failures: usize,
    pub archive_failures: usize,
    /// `None` when writing the artifact failed (the error is logged).
    pub artifacts: Option<RunArtifacts>,
    pub elapsed: Duration,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            listed: 0,
            filtered_out: 0,
            records: Vec::new(),
            dropped: Vec::new(),
            sink_failures: 0,
            archive_failures: 0,
            artifacts: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn count(&self, status: TenderStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a surviving tender is processed.
    fn tender_started(&self, reference: &str, current: usize, total: usize);
    /// Called after a tender; `None` means it was dropped.
    fn tender_finished(&self, reference: &str, status: Option<TenderStatus>);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn tender_started(&self, _reference: &str, _current: usize, _total: usize) {}
    fn tender_finished(&self, _reference: &str, _status: Option<TenderStatus>) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The per-run driver.
pub struct Pipeline {
    config: PipelineConfig,
    filter: SubjectFilter,
    acquirer: Acquirer,
    assembler: Arc<dyn RecordAssembler>,
    sink: Box<dyn RecordSink>,
    archiver: Box<dyn BundleArchiver>,
}

impl Pipeline {
    /// Wire up every component from the application config.
    pub fn from_config(app: &AppConfig) -> Result<Self> {
        let extractor = Extractor::new(app.extraction.clone());
        let archiver: Box<dyn BundleArchiver> = match app.output.archive_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => Box::new(DirectoryArchiver::new(dir)),
            _ => Box::new(NoArchive),
        };

        Ok(Self {
            config: PipelineConfig::from_app(app),
            filter: SubjectFilter::from_config(&app.filters),
            acquirer: Acquirer::new(AcquireSettings::from(&app.download)),
            assembler: Arc::new(Assembler::new(extractor, &app.filters.file_denylist)),
            sink: sink_from_config(&app.sink)?,
            archiver,
        })
    }

    /// Assemble a pipeline from explicit parts.
    pub fn new(
        config: PipelineConfig,
        filter: SubjectFilter,
        acquirer: Acquirer,
        assembler: impl RecordAssembler + 'static,
    ) -> Self {
        Self {
            config,
            filter,
            acquirer,
            assembler: Arc::new(assembler),
            sink: Box::new(crate::sink::NullSink),
            archiver: Box::new(NoArchive),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_archiver(mut self, archiver: Box<dyn BundleArchiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run for tenders published on `date`.
    ///
    /// The artifact is written whatever happens. Only an unreachable source
    /// is returned as an error, after finalization.
    #[instrument(skip_all, fields(source = source.name(), date = %date))]
    pub async fn run(
        &self,
        source: &dyn TenderSource,
        date: NaiveDate,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new();
        info!(run_id = %report.run_id, "starting run");

        progress.phase("Connecting to tender source");
        let outcome = match self.connect_and_list(source, date).await {
            Ok(tenders) => {
                self.process(source, tenders, &mut report, progress).await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "tender source unavailable, finalizing");
                Err(e)
            }
        };

        self.finalize(&mut report, start, progress);
        outcome.map(|()| report)
    }

    /// Process an already listed batch of tenders, then finalize.
    #[instrument(skip_all, fields(source = source.name(), tenders = tenders.len()))]
    pub async fn run_tenders(
        &self,
        source: &dyn TenderSource,
        tenders: Vec<Tender>,
        progress: &dyn ProgressReporter,
    ) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new();
        self.process(source, tenders, &mut report, progress).await;
        self.finalize(&mut report, start, progress);
        report
    }

    /// Connect and list, retrying the pair with a fixed backoff.
    async fn connect_and_list(
        &self,
        source: &dyn TenderSource,
        date: NaiveDate,
    ) -> Result<Vec<Tender>> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = match source.connect().await {
                Ok(()) => source.list_tenders(date).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(tenders) => {
                    info!(attempt, count = tenders.len(), "tenders listed");
                    return Ok(tenders);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "source attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.connect_backoff).await;
            }
        }

        Err(TenderflowError::SourceUnavailable {
            attempts,
            message: last_error,
        })
    }

    async fn process(
        &self,
        source: &dyn TenderSource,
        tenders: Vec<Tender>,
        report: &mut RunReport,
        progress: &dyn ProgressReporter,
    ) {
        report.listed += tenders.len();

        progress.phase("Filtering tenders");
        let mut kept = Vec::with_capacity(tenders.len());
        for tender in tenders {
            if let Some(keyword) = self.filter.matched_keyword(&tender.subject) {
                info!(reference = %tender.reference, keyword, "filtered out by subject");
                report.filtered_out += 1;
            } else {
                kept.push(tender);
            }
        }

        progress.phase("Processing tenders");
        let total = kept.len();
        for (i, tender) in kept.into_iter().enumerate() {
            let reference = tender.reference.clone();
            progress.tender_started(&reference, i + 1, total);

            match self.process_one(source, tender, report).await {
                Ok(record) => {
                    let emitted = record.to_emitted(Utc::now());
                    if let Err(e) = self.sink.deliver(&emitted).await {
                        debug!(error = %e, "sink failure counted");
                        report.sink_failures += 1;
                    }
                    progress.tender_finished(&reference, Some(emitted.status));
                    report.records.push(emitted);
                }
                Err(e) => {
                    error!(reference = %reference, error = %e, "tender dropped");
                    progress.tender_finished(&reference, None);
                    report.dropped.push(DroppedTender {
                        reference,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    #[instrument(skip_all, fields(reference = %tender.reference))]
    async fn process_one(
        &self,
        source: &dyn TenderSource,
        tender: Tender,
        report: &mut RunReport,
    ) -> Result<TenderRecord> {
        let zone = LandingZone::create(&self.config.landing_root, &tender.reference)?;
        let acquisition = self
            .acquirer
            .acquire(source, &tender.bundle_handle, &zone)
            .await?;

        if let Acquisition::Ready(bundle) = &acquisition {
            if let Err(e) = self.archiver.archive(&tender.reference, bundle) {
                warn!(error = %e, "bundle archiving failed");
                report.archive_failures += 1;
            }
        }

        let assembler = Arc::clone(&self.assembler);
        let record = tokio::task::spawn_blocking(move || assembler.assemble(tender, &acquisition))
            .await
            .map_err(|e| TenderflowError::Task(format!("assembly: {e}")))?;

        // Removes the bundle and everything unpacked from it.
        drop(zone);
        Ok(record)
    }

    fn finalize(&self, report: &mut RunReport, start: Instant, progress: &dyn ProgressReporter) {
        progress.phase("Writing run artifacts");
        match write_run_artifacts(
            &self.config.summary_path,
            &report.records,
            self.config.write_json,
        ) {
            Ok(artifacts) => report.artifacts = Some(artifacts),
            Err(e) => error!(error = %e, "run artifact could not be written"),
        }

        // Zones clean up after themselves; an empty root is all that is left.
        match std::fs::remove_dir(&self.config.landing_root) {
            Ok(()) => debug!(root = %self.config.landing_root.display(), "landing root removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                root = %self.config.landing_root.display(),
                error = %e,
                "landing root left in place"
            ),
        }

        report.elapsed = start.elapsed();
        info!(
            run_id = %report.run_id,
            listed = report.listed,
            filtered_out = report.filtered_out,
            records = report.records.len(),
            dropped = report.dropped.len(),
            sink_failures = report.sink_failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(report);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use tenderflow_extract::{ExtractFailure, OcrEngine};
    use tenderflow_shared::{
        BundleHandle, DOWNLOAD_FAILED_TEXT, DownloadConfig, ExtractionConfig, FilterConfig,
    };
    use tenderflow_source::ManifestSource;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sink::WebhookSink;

    /// How the fake source answers a download trigger.
    #[derive(Clone)]
    enum Bundle {
        /// Copy this file into the landing zone.
        File(PathBuf),
        /// Never write anything.
        Never,
        /// Fail the trigger.
        Broken,
    }

    struct FakeSource {
        bundles: HashMap<String, Bundle>,
        tenders: Vec<Tender>,
        connect_failures: AtomicUsize,
        connects: AtomicUsize,
        triggered: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(entries: Vec<(Tender, Bundle)>) -> Self {
            let mut bundles = HashMap::new();
            let mut tenders = Vec::new();
            for (tender, bundle) in entries {
                bundles.insert(tender.bundle_handle.0.clone(), bundle);
                tenders.push(tender);
            }
            Self {
                bundles,
                tenders,
                connect_failures: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                triggered: Mutex::new(Vec::new()),
            }
        }

        fn triggered(&self) -> Vec<String> {
            self.triggered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TenderSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn connect(&self) -> Result<()> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.connect_failures.load(Ordering::SeqCst) {
                return Err(TenderflowError::Network("connection refused".into()));
            }
            Ok(())
        }

        async fn list_tenders(&self, _date: NaiveDate) -> Result<Vec<Tender>> {
            Ok(self.tenders.clone())
        }

        async fn trigger_download(&self, handle: &BundleHandle, dir: &Path) -> Result<()> {
            self.triggered.lock().unwrap().push(handle.0.clone());
            match self.bundles.get(handle.as_str()) {
                Some(Bundle::File(src)) => {
                    let name = src.file_name().unwrap();
                    std::fs::copy(src, dir.join(name)).unwrap();
                    Ok(())
                }
                Some(Bundle::Never) => Ok(()),
                Some(Bundle::Broken) | None => {
                    Err(TenderflowError::Source("download link missing".into()))
                }
            }
        }
    }

    /// Real assembly, except the worker dies on one reference.
    struct DiesOn {
        inner: Assembler,
        reference: &'static str,
    }

    impl RecordAssembler for DiesOn {
        fn assemble(&self, tender: Tender, acquisition: &Acquisition) -> TenderRecord {
            if tender.reference == self.reference {
                panic!("assembly worker died on {}", tender.reference);
            }
            self.inner.assemble(tender, acquisition)
        }
    }

    struct CountingOcr {
        calls: AtomicUsize,
        text: &'static str,
    }

    impl OcrEngine for CountingOcr {
        fn recognize_pdf(&self, _: &Path, _: u32, _: &str) -> std::result::Result<String, ExtractFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        ocr: Arc<CountingOcr>,
    }

    impl Fixture {
        fn new(ocr_text: &'static str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            Self {
                _dir: dir,
                root,
                ocr: Arc::new(CountingOcr {
                    calls: AtomicUsize::new(0),
                    text: ocr_text,
                }),
            }
        }

        fn config(&self) -> PipelineConfig {
            PipelineConfig {
                landing_root: self.root.join("downloads_temp"),
                summary_path: self.root.join("tender_results_summary.csv"),
                write_json: false,
                connect_attempts: 3,
                connect_backoff: Duration::ZERO,
            }
        }

        fn assembler(&self) -> Assembler {
            let extractor = Extractor::with_ocr(ExtractionConfig::default(), self.ocr.clone());
            Assembler::new(extractor, ["cps"])
        }

        fn pipeline(&self) -> Pipeline {
            self.pipeline_with(self.assembler())
        }

        fn pipeline_with(&self, assembler: impl RecordAssembler + 'static) -> Pipeline {
            let download = DownloadConfig {
                timeout_secs: 1,
                poll_interval_ms: 20,
                ..DownloadConfig::default()
            };
            Pipeline::new(
                self.config(),
                SubjectFilter::from_config(&FilterConfig::default()),
                Acquirer::new(AcquireSettings::from(&download)),
                assembler,
            )
        }

        fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let dir = self.root.join("fixtures");
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            std::fs::write(&path, bytes).unwrap();
            path
        }
    }

    fn tender(reference: &str, subject: &str) -> Tender {
        Tender {
            reference: reference.into(),
            subject: subject.into(),
            buyer: "Office national".into(),
            location: "Rabat".into(),
            deadline: "15/04/2026 10:00".into(),
            bundle_handle: BundleHandle(format!("handle/{reference}")),
        }
    }

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        use std::io::Write;
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// One-page PDF; `None` gives a page with no text at all.
    fn pdf_bytes(text: Option<&str>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let operations = match text {
            Some(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![40.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
            None => Vec::new(),
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let kids: Vec<Object> = vec![page_id.into()];
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn docx(text: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"#
        );
        zip_of(&[("word/document.xml", xml.into_bytes())])
    }

    fn read_summary(path: &Path) -> Vec<Vec<String>> {
        let bytes = std::fs::read(path).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&bytes[3..]);
        reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn excluded_subject_never_reaches_the_acquirer() {
        let fx = Fixture::new("unused");
        let bundle = fx.file("avis.txt", b"Avis");
        let source = FakeSource::new(vec![(
            tender("AO-A", "Fourniture de matériel"),
            Bundle::File(bundle),
        )]);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        assert_eq!(report.filtered_out, 1);
        assert!(report.records.is_empty());
        assert!(source.triggered().is_empty());
        assert_eq!(read_summary(&fx.config().summary_path).len(), 1);
    }

    #[tokio::test]
    async fn text_pdf_is_merged_and_cps_file_skipped() {
        let fx = Fixture::new("unused");
        let body = "Objet de la consultation etude de faisabilite technique et financiere \
                    du projet de mise a niveau urbaine de la commune avec diagnostic territorial \
                    complet et proposition de scenarios d amenagement chiffres pour chaque quartier";
        let bundle = fx.file(
            "dce.zip",
            &zip_of(&[
                ("doc1.pdf", pdf_bytes(Some(body))),
                ("cps_annexe.docx", docx("Cahier des prescriptions speciales")),
            ]),
        );
        let source = FakeSource::new(vec![(tender("AO-B", "Etude urbaine"), Bundle::File(bundle))]);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.status, TenderStatus::Extracted);
        assert!(record.merged_text.starts_with("--- Content from file: doc1.pdf ---\n"));
        assert!(record.merged_text.contains("diagnostic territorial"));
        assert!(!record.merged_text.contains("prescriptions"));
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_timeout_records_sentinel() {
        let fx = Fixture::new("unused");
        let source = FakeSource::new(vec![(tender("AO-C", "Assistance technique"), Bundle::Never)]);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, TenderStatus::DownloadFailed);
        assert_eq!(report.records[0].merged_text, DOWNLOAD_FAILED_TEXT);
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scanned_pdf_goes_through_ocr() {
        let fx = Fixture::new("Texte reconnu par OCR sur la page numerisee");
        let bundle = fx.file("scan.pdf", &pdf_bytes(None));
        let source = FakeSource::new(vec![(tender("AO-D", "Audit"), Bundle::File(bundle))]);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 1);
        let record = &report.records[0];
        assert_eq!(record.status, TenderStatus::Extracted);
        assert_eq!(
            record.merged_text,
            "--- Content from file: scan.pdf ---\nTexte reconnu par OCR sur la page numerisee"
        );
    }

    #[tokio::test]
    async fn failing_tender_is_dropped_and_run_continues() {
        let fx = Fixture::new("unused");
        let mut entries = Vec::new();
        for i in 1..=5 {
            let reference = format!("AO-{i}");
            let bundle = if i == 3 {
                Bundle::Broken
            } else {
                Bundle::File(fx.file(&format!("avis{i}.txt"), format!("Avis numero {i}").as_bytes()))
            };
            entries.push((tender(&reference, "Etude"), bundle));
        }
        let source = FakeSource::new(entries);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        let refs: Vec<&str> = report.records.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["AO-1", "AO-2", "AO-4", "AO-5"]);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].reference, "AO-3");

        let rows = read_summary(&fx.config().summary_path);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3][0], "AO-4");
        assert!(!fx.config().landing_root.exists());
    }

    #[tokio::test]
    async fn assembly_failure_drops_only_that_tender() {
        let fx = Fixture::new("unused");
        let mut entries = Vec::new();
        for i in 1..=5 {
            let bundle = fx.file(&format!("avis{i}.txt"), format!("Avis numero {i}").as_bytes());
            entries.push((tender(&format!("AO-{i}"), "Etude"), Bundle::File(bundle)));
        }
        let source = FakeSource::new(entries);
        let pipeline = fx.pipeline_with(DiesOn {
            inner: fx.assembler(),
            reference: "AO-3",
        });

        let report = pipeline.run(&source, date(), &SilentProgress).await.unwrap();

        let refs: Vec<&str> = report.records.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["AO-1", "AO-2", "AO-4", "AO-5"]);
        assert!(report.records.iter().all(|r| r.status == TenderStatus::Extracted));
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].reference, "AO-3");
        assert!(report.dropped[0].error.starts_with("task failed: assembly"));

        assert_eq!(read_summary(&fx.config().summary_path).len(), 5);
        assert!(!fx.config().landing_root.exists());
    }

    #[tokio::test]
    async fn failed_bundle_fetch_records_download_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fx = Fixture::new("unused");
        fx.file("avis.txt", b"Avis de consultation");
        let manifest = fx.root.join("manifest.json");
        let entries = serde_json::json!([
            {"reference": "AO-W1", "subject": "Etude", "bundle_handle": format!("{}/dce/1.zip", server.uri())},
            {"reference": "AO-W2", "subject": "Etude", "bundle_handle": "fixtures/avis.txt"},
        ]);
        std::fs::write(&manifest, entries.to_string()).unwrap();
        let source = ManifestSource::open(&manifest).unwrap();

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();

        assert!(report.dropped.is_empty());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].reference, "AO-W1");
        assert_eq!(report.records[0].status, TenderStatus::DownloadFailed);
        assert_eq!(report.records[0].merged_text, DOWNLOAD_FAILED_TEXT);
        assert_eq!(report.records[1].status, TenderStatus::Extracted);

        let rows = read_summary(&fx.config().summary_path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0], "AO-W1");
    }

    #[tokio::test]
    async fn unreachable_source_still_writes_artifact() {
        let fx = Fixture::new("unused");
        let source = FakeSource::new(vec![]);
        source.connect_failures.store(10, Ordering::SeqCst);

        let err = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap_err();

        assert!(matches!(err, TenderflowError::SourceUnavailable { attempts: 3, .. }));
        assert_eq!(source.connects.load(Ordering::SeqCst), 3);
        assert_eq!(read_summary(&fx.config().summary_path).len(), 1);
    }

    #[tokio::test]
    async fn connect_is_retried_before_giving_up() {
        let fx = Fixture::new("unused");
        let source = FakeSource::new(vec![]);
        source.connect_failures.store(2, Ordering::SeqCst);

        let report = fx.pipeline().run(&source, date(), &SilentProgress).await.unwrap();
        assert_eq!(source.connects.load(Ordering::SeqCst), 3);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let fx = Fixture::new("unused");
        let a = fx.file("a.txt", b"Premier avis");
        let b = fx.file("b.txt", b"Second avis");
        let source = FakeSource::new(vec![
            (tender("AO-S1", "Etude"), Bundle::File(a)),
            (tender("AO-S2", "Etude"), Bundle::File(b)),
        ]);
        let sink = WebhookSink::new(&server.uri(), Duration::from_secs(5)).unwrap();

        let report = fx
            .pipeline()
            .with_sink(Box::new(sink))
            .run_tenders(&source, source.tenders.clone(), &SilentProgress)
            .await;

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.sink_failures, 2);
        assert!(report.artifacts.is_some());
    }

    #[tokio::test]
    async fn bundles_are_archived_when_configured() {
        let fx = Fixture::new("unused");
        let bundle = fx.file("dce.zip", &zip_of(&[("rc.txt", b"Reglement".to_vec())]));
        let source = FakeSource::new(vec![(tender("AO-12/2026", "Etude"), Bundle::File(bundle))]);
        let archive_root = fx.root.join("archive");

        let report = fx
            .pipeline()
            .with_archiver(Box::new(DirectoryArchiver::new(&archive_root)))
            .run(&source, date(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.archive_failures, 0);
        assert!(archive_root.join("AO-12_2026/dce.zip").is_file());
        assert_eq!(report.count(TenderStatus::Extracted), 1);
    }
}
