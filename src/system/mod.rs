//! System interactions (clipboard, screenshot, OCR, text cleanup)

pub mod clipboard;
pub mod ocr;
pub mod screenshot;
pub mod text_cleanup;

pub use clipboard::{AutoPaster, ClipboardError, ClipboardWriter, KeystrokePaster, SystemClipboard};
pub use ocr::{HelperRecognizer, OcrEngine, OcrError, OcrOutcome, RecognitionLevel, RecognitionService};
pub use screenshot::{
    CaptureFailure, CaptureResult, CaptureService, CaptureTempStore, CaptureToolCommand,
    ScreenCaptureTool, STALE_CAPTURE_AGE,
};
pub use text_cleanup::cleanup_text;
