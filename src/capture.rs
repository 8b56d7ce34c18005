//! Capture/upload page state.
//!
//! [`CaptureSession`] owns everything the capture page shows: the live camera
//! (if any), the selected image and the upload outcome. UI events call its
//! methods; the page renders from its accessors. Camera hardware is reached
//! through the [`Camera`] and [`MediaStream`] traits.
//!
//! A live camera and a selected image are never held at the same time, and
//! every track of a stream is stopped when the camera is cancelled, when a
//! photo is taken, when the camera is restarted and when the session drops.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::client::{DocumentSubmitter, UploadError};
use crate::llm::detect_image_mime;
use crate::models::ProcessResponse;

pub const CAPTURED_FILE_NAME: &str = "captured-image.jpg";
pub const JPEG_QUALITY: u8 = 95;
pub const OCTET_STREAM: &str = "application/octet-stream";

pub const CAMERA_PERMISSION_MESSAGE: &str =
    "Unable to access camera. Please ensure you have granted camera permissions.";
pub const NO_FILE_MESSAGE: &str = "Please select or capture an image first";
pub const SUCCESS_MESSAGE: &str = "Document processed successfully!";

// ============================================================================
// Camera abstraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

/// Video constraints passed to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera available")]
    Unavailable,

    #[error("Failed to read a frame: {0}")]
    Frame(String),
}

/// One RGBA8 video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A live video stream owned by the session.
pub trait MediaStream: Send {
    /// Read the current frame at the stream's native resolution.
    fn grab_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop every track of the stream. Must be idempotent.
    fn stop_all_tracks(&mut self);
}

/// Device camera access (the permission prompt happens inside `open`).
#[async_trait::async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self, constraints: CameraConstraints) -> Result<Box<dyn MediaStream>, CameraError>;
}

// ============================================================================
// Selected file
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrigin {
    Camera,
    Picker,
}

/// The file that will be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub origin: FileOrigin,
}

impl SelectedFile {
    /// A file chosen in the file picker. The bytes are used as-is; an empty
    /// or malformed type (browsers report `""` for unknown files) becomes
    /// `application/octet-stream`.
    pub fn from_picker(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        let mime_type: String = mime_type.into();
        Self {
            name: name.into(),
            mime_type: normalize_mime(&mime_type).to_string(),
            data,
            origin: FileOrigin::Picker,
        }
    }

    /// Read a picked file from disk, detecting its type from its contents.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let mime_type = detect_image_mime(&data).unwrap_or(OCTET_STREAM);
        Ok(Self::from_picker(name, mime_type, data))
    }

    /// Encode a camera frame as a JPEG file.
    pub fn from_frame(frame: &Frame) -> Result<Self, CameraError> {
        Ok(Self {
            name: CAPTURED_FILE_NAME.to_string(),
            mime_type: "image/jpeg".to_string(),
            data: encode_jpeg(frame, JPEG_QUALITY)?,
            origin: FileOrigin::Camera,
        })
    }

    /// `data:` URL for previewing the file.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }
}

/// `mime_type` trimmed, or `application/octet-stream` when it is not a
/// `type/subtype` pair.
pub fn normalize_mime(mime_type: &str) -> &str {
    let mime_type = mime_type.trim();
    let well_formed = match mime_type.split_once('/') {
        Some((kind, subtype)) => {
            let token = |s: &str| {
                !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '/')
            };
            token(kind) && token(subtype.split(';').next().unwrap_or_default().trim())
        }
        None => false,
    };
    if well_formed {
        mime_type
    } else {
        OCTET_STREAM
    }
}

/// Encode an RGBA frame as JPEG, dropping the alpha channel.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CameraError> {
    let rgba = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| {
            CameraError::Frame(format!(
                "expected {} bytes for a {}x{} frame, got {}",
                frame.width as usize * frame.height as usize * 4,
                frame.width,
                frame.height,
                frame.rgba.len()
            ))
        })?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
        .map_err(|e| CameraError::Frame(e.to_string()))?;
    Ok(jpeg)
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Page state derived from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    IdleEmpty,
    CameraActive,
    FileSelected,
    Uploading,
    Success,
    Error,
}

/// The capture button while the camera is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureButton {
    /// The video has not reported it can play yet; capturing is refused.
    Preparing,
    Ready,
}

impl CaptureButton {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Preparing => "Preparing Camera...",
            Self::Ready => "Take Picture",
        }
    }

    pub fn enabled(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The button next to "Upload ID" once an image is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryAction {
    Retake,
    SelectNew,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Camera is not active")]
    CameraInactive,

    #[error("Camera is not ready")]
    CameraNotReady,

    #[error("Retake is only available for photos taken with the camera")]
    RetakeUnavailable,
}

struct LiveCamera {
    stream: Box<dyn MediaStream>,
    ready: bool,
}

struct Selection {
    file: SelectedFile,
    data_url: String,
}

/// Proof that an upload was started; results are only applied for the
/// newest ticket.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    generation: u64,
    file: SelectedFile,
}

impl UploadTicket {
    pub fn file(&self) -> &SelectedFile {
        &self.file
    }
}

pub struct CaptureSession {
    constraints: CameraConstraints,
    camera: Option<LiveCamera>,
    selection: Option<Selection>,
    status: UploadStatus,
    error: Option<String>,
    last_response: Option<ProcessResponse>,
    generation: u64,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::with_constraints(CameraConstraints::default())
    }

    pub fn with_constraints(constraints: CameraConstraints) -> Self {
        Self {
            constraints,
            camera: None,
            selection: None,
            status: UploadStatus::Idle,
            error: None,
            last_response: None,
            generation: 0,
        }
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    /// Open the camera. A previous stream is released first. When the camera
    /// cannot be opened the selection and any upload in flight are kept.
    pub async fn start_camera(&mut self, camera: &dyn Camera) -> Result<(), CaptureError> {
        self.release_stream();

        match camera.open(self.constraints).await {
            Ok(stream) => {
                info!("Camera started");
                self.camera = Some(LiveCamera {
                    stream,
                    ready: false,
                });
                self.clear_selection();
                self.generation += 1;
                Ok(())
            }
            Err(e) => {
                warn!("Error accessing camera: {}", e);
                self.error = Some(CAMERA_PERMISSION_MESSAGE.to_string());
                Err(e.into())
            }
        }
    }

    /// The video element can play; capture becomes possible.
    pub fn camera_ready(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.ready = true;
        }
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera.is_some()
    }

    /// `None` when the camera is not showing.
    pub fn capture_button(&self) -> Option<CaptureButton> {
        self.camera.as_ref().map(|c| {
            if c.ready {
                CaptureButton::Ready
            } else {
                CaptureButton::Preparing
            }
        })
    }

    /// Take a photo, select it and stop the camera.
    ///
    /// Refused until [`camera_ready`](Self::camera_ready) has been called. If
    /// the frame cannot be read the camera keeps running.
    pub fn capture_photo(&mut self) -> Result<(), CaptureError> {
        let camera = self.camera.as_mut().ok_or(CaptureError::CameraInactive)?;
        if !camera.ready {
            return Err(CaptureError::CameraNotReady);
        }

        let frame = camera.stream.grab_frame()?;
        let file = SelectedFile::from_frame(&frame)?;
        debug!(
            "Captured {}x{} frame ({} bytes as JPEG)",
            frame.width,
            frame.height,
            file.data.len()
        );

        self.stop_camera();
        self.set_selection(file);
        Ok(())
    }

    /// Cancel the camera, releasing every track.
    pub fn stop_camera(&mut self) {
        self.release_stream();
    }

    fn release_stream(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stream.stop_all_tracks();
            debug!("Camera stream released");
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Select a file from the picker.
    pub fn select_file(&mut self, file: SelectedFile) {
        self.release_stream();
        self.set_selection(file);
    }

    fn set_selection(&mut self, file: SelectedFile) {
        let data_url = file.data_url();
        self.selection = Some(Selection { file, data_url });
        self.status = UploadStatus::Idle;
        self.error = None;
        self.last_response = None;
        self.generation += 1;
    }

    fn clear_selection(&mut self) {
        self.selection = None;
        self.status = UploadStatus::Idle;
        self.error = None;
        self.last_response = None;
    }

    /// Discard the current image and go back to the empty page.
    pub fn select_new(&mut self) {
        self.clear_selection();
        self.generation += 1;
    }

    /// Discard a camera photo and reopen the camera.
    pub async fn retake(&mut self, camera: &dyn Camera) -> Result<(), CaptureError> {
        if self.secondary_action() != Some(SecondaryAction::Retake) {
            return Err(CaptureError::RetakeUnavailable);
        }
        self.clear_selection();
        self.start_camera(camera).await
    }

    /// Which secondary button to show for the current selection.
    pub fn secondary_action(&self) -> Option<SecondaryAction> {
        self.selection.as_ref().map(|s| match s.file.origin {
            FileOrigin::Camera => SecondaryAction::Retake,
            FileOrigin::Picker => SecondaryAction::SelectNew,
        })
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Mark the upload as started. Returns `None` (and sets an error) when
    /// nothing is selected.
    pub fn begin_upload(&mut self) -> Option<UploadTicket> {
        let Some(selection) = self.selection.as_ref() else {
            self.error = Some(NO_FILE_MESSAGE.to_string());
            return None;
        };

        let file = selection.file.clone();
        self.status = UploadStatus::Loading;
        self.error = None;
        self.last_response = None;
        self.generation += 1;

        Some(UploadTicket {
            generation: self.generation,
            file,
        })
    }

    /// Apply an upload result. Returns false when the ticket is stale and the
    /// result was dropped.
    pub fn finish_upload(
        &mut self,
        ticket: UploadTicket,
        result: Result<ProcessResponse, UploadError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding stale upload result (ticket {}, current {})",
                ticket.generation, self.generation
            );
            return false;
        }

        match result {
            Ok(response) => {
                info!("Document processed successfully: {}", response.document_id);
                self.status = UploadStatus::Success;
                self.last_response = Some(response);
            }
            Err(e) => {
                warn!("Error during upload: {:?}", e);
                self.status = UploadStatus::Error;
                self.error = Some(e.user_message());
            }
        }
        true
    }

    /// Submit the selected file and apply the result.
    pub async fn upload(&mut self, submitter: &dyn DocumentSubmitter) {
        let Some(ticket) = self.begin_upload() else {
            return;
        };
        let result = submitter.submit(ticket.file()).await;
        self.finish_upload(ticket, result);
    }

    /// Close the error alert.
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub fn phase(&self) -> CapturePhase {
        if self.camera.is_some() {
            return CapturePhase::CameraActive;
        }
        match (&self.selection, self.status) {
            (None, _) => CapturePhase::IdleEmpty,
            (Some(_), UploadStatus::Idle) => CapturePhase::FileSelected,
            (Some(_), UploadStatus::Loading) => CapturePhase::Uploading,
            (Some(_), UploadStatus::Success) => CapturePhase::Success,
            (Some(_), UploadStatus::Error) => CapturePhase::Error,
        }
    }

    /// Preview `data:` URL of the selected image.
    pub fn selected_image(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.data_url.as_str())
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selection.as_ref().map(|s| &s.file)
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success_message(&self) -> Option<&'static str> {
        (self.status == UploadStatus::Success).then_some(SUCCESS_MESSAGE)
    }

    pub fn last_response(&self) -> Option<&ProcessResponse> {
        self.last_response.as_ref()
    }

    /// Label and enabled state of the upload button.
    pub fn upload_button(&self) -> (&'static str, bool) {
        if self.status == UploadStatus::Loading {
            ("Processing...", false)
        } else {
            ("Upload ID", true)
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts live tracks across every stream it hands out.
    #[derive(Default)]
    struct FakeCamera {
        live_tracks: Arc<AtomicUsize>,
        deny: bool,
        seen_constraints: Mutex<Vec<CameraConstraints>>,
    }

    struct FakeStream {
        live_tracks: Arc<AtomicUsize>,
        tracks: usize,
    }

    impl MediaStream for FakeStream {
        fn grab_frame(&mut self) -> Result<Frame, CameraError> {
            Ok(Frame {
                width: 4,
                height: 2,
                rgba: vec![200; 4 * 2 * 4],
            })
        }

        fn stop_all_tracks(&mut self) {
            self.live_tracks.fetch_sub(self.tracks, Ordering::SeqCst);
            self.tracks = 0;
        }
    }

    #[async_trait::async_trait]
    impl Camera for FakeCamera {
        async fn open(
            &self,
            constraints: CameraConstraints,
        ) -> Result<Box<dyn MediaStream>, CameraError> {
            self.seen_constraints.lock().unwrap().push(constraints);
            if self.deny {
                return Err(CameraError::PermissionDenied);
            }
            self.live_tracks.fetch_add(2, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live_tracks: self.live_tracks.clone(),
                tracks: 2,
            }))
        }
    }

    impl FakeCamera {
        fn live(&self) -> usize {
            self.live_tracks.load(Ordering::SeqCst)
        }
    }

    struct FixedSubmitter(Result<ProcessResponse, UploadError>);

    #[async_trait::async_trait]
    impl DocumentSubmitter for FixedSubmitter {
        async fn submit(&self, _file: &SelectedFile) -> Result<ProcessResponse, UploadError> {
            self.0.clone()
        }
    }

    fn response() -> ProcessResponse {
        ProcessResponse {
            document_id: "doc1".into(),
            document_type: "american_passport".into(),
            extracted_data: Map::new(),
            metadata: serde_json::Value::Null,
            needs_manual_review: false,
            document_image_url: None,
        }
    }

    fn picked() -> SelectedFile {
        SelectedFile::from_picker("id.png", "image/png", vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_camera_requests_environment_hd() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();

        let seen = camera.seen_constraints.lock().unwrap().clone();
        assert_eq!(seen, vec![CameraConstraints::default()]);
        assert_eq!(seen[0].facing_mode, FacingMode::Environment);
        assert_eq!((seen[0].ideal_width, seen[0].ideal_height), (1920, 1080));
        assert_eq!(session.phase(), CapturePhase::CameraActive);
    }

    #[tokio::test]
    async fn test_capture_waits_for_ready() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();

        assert_eq!(session.capture_button(), Some(CaptureButton::Preparing));
        assert_eq!(session.capture_button().unwrap().label(), "Preparing Camera...");
        assert!(!session.capture_button().unwrap().enabled());
        assert_eq!(session.capture_photo(), Err(CaptureError::CameraNotReady));
        assert!(session.is_camera_active());
        assert!(session.selected_image().is_none());

        session.camera_ready();
        assert_eq!(session.capture_button(), Some(CaptureButton::Ready));
        session.capture_photo().unwrap();

        assert!(!session.is_camera_active());
        assert_eq!(camera.live(), 0);
        let file = session.selected_file().unwrap();
        assert_eq!(file.name, CAPTURED_FILE_NAME);
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.origin, FileOrigin::Camera);
        assert_eq!(image::guess_format(&file.data).unwrap(), image::ImageFormat::Jpeg);
        assert!(session
            .selected_image()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(session.phase(), CapturePhase::FileSelected);
        assert_eq!(session.secondary_action(), Some(SecondaryAction::Retake));
    }

    #[tokio::test]
    async fn test_capture_without_camera() {
        let mut session = CaptureSession::new();
        assert_eq!(session.capture_photo(), Err(CaptureError::CameraInactive));
        assert_eq!(session.capture_button(), None);
    }

    #[tokio::test]
    async fn test_stop_camera_releases_tracks() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();
        assert_eq!(camera.live(), 2);

        session.stop_camera();
        assert_eq!(camera.live(), 0);
        assert_eq!(session.phase(), CapturePhase::IdleEmpty);
        assert_eq!(session.capture_button(), None);
    }

    #[tokio::test]
    async fn test_restart_releases_previous_stream() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();
        session.start_camera(&camera).await.unwrap();
        assert_eq!(camera.live(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let camera = FakeCamera::default();
        {
            let mut session = CaptureSession::new();
            session.start_camera(&camera).await.unwrap();
            assert_eq!(camera.live(), 2);
        }
        assert_eq!(camera.live(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let camera = FakeCamera {
            deny: true,
            ..Default::default()
        };
        let mut session = CaptureSession::new();
        let err = session.start_camera(&camera).await.unwrap_err();
        assert_eq!(err, CaptureError::Camera(CameraError::PermissionDenied));
        assert!(!session.is_camera_active());
        assert_eq!(session.error_message(), Some(CAMERA_PERMISSION_MESSAGE));

        session.dismiss_error();
        assert_eq!(session.error_message(), None);
    }

    #[tokio::test]
    async fn test_camera_denied_during_upload_keeps_upload_live() {
        let camera = FakeCamera {
            deny: true,
            ..Default::default()
        };
        let mut session = CaptureSession::new();
        session.select_file(picked());
        let ticket = session.begin_upload().unwrap();

        assert!(session.start_camera(&camera).await.is_err());
        assert_eq!(session.phase(), CapturePhase::Uploading);

        assert!(session.finish_upload(ticket, Err(UploadError::DocumentNotRecognized)));
        assert_eq!(session.phase(), CapturePhase::Error);
        assert_eq!(session.upload_button(), ("Upload ID", true));
        assert_eq!(
            session.error_message(),
            Some(UploadError::DocumentNotRecognized.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_camera_start_during_upload_discards_result() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.select_file(picked());
        let ticket = session.begin_upload().unwrap();

        session.start_camera(&camera).await.unwrap();
        assert!(!session.finish_upload(ticket, Ok(response())));
        assert_eq!(session.phase(), CapturePhase::CameraActive);
        assert_eq!(session.status(), UploadStatus::Idle);
    }

    #[test]
    fn test_picker_type_is_normalized() {
        let file = SelectedFile::from_picker("scan", "", vec![1]);
        assert_eq!(file.mime_type, OCTET_STREAM);
        assert!(file.data_url().starts_with("data:application/octet-stream;base64,"));

        assert_eq!(normalize_mime(" image/png "), "image/png");
        assert_eq!(normalize_mime("image/jpeg; q=1"), "image/jpeg; q=1");
        assert_eq!(normalize_mime("png"), OCTET_STREAM);
        assert_eq!(normalize_mime("image/"), OCTET_STREAM);
        assert_eq!(normalize_mime("/png"), OCTET_STREAM);
        assert_eq!(normalize_mime("image/png/x"), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_select_file_clears_previous_result() {
        let mut session = CaptureSession::new();
        session.select_file(picked());
        session
            .upload(&FixedSubmitter(Err(UploadError::DocumentNotRecognized)))
            .await;
        assert_eq!(session.status(), UploadStatus::Error);
        assert!(session.error_message().is_some());

        session.select_file(SelectedFile::from_picker("other.jpg", "image/jpeg", vec![9]));
        assert_eq!(session.status(), UploadStatus::Idle);
        assert_eq!(session.error_message(), None);
        assert_eq!(session.selected_file().unwrap().name, "other.jpg");
        assert_eq!(session.secondary_action(), Some(SecondaryAction::SelectNew));
    }

    #[tokio::test]
    async fn test_select_file_stops_camera() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();
        session.select_file(picked());
        assert_eq!(camera.live(), 0);
        assert_eq!(session.phase(), CapturePhase::FileSelected);
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let mut session = CaptureSession::new();
        session.upload(&FixedSubmitter(Ok(response()))).await;
        assert_eq!(session.error_message(), Some(NO_FILE_MESSAGE));
        assert_eq!(session.status(), UploadStatus::Idle);
    }

    #[tokio::test]
    async fn test_upload_success() {
        let mut session = CaptureSession::new();
        session.select_file(picked());
        session.upload(&FixedSubmitter(Ok(response()))).await;
        assert_eq!(session.phase(), CapturePhase::Success);
        assert_eq!(session.success_message(), Some(SUCCESS_MESSAGE));
        assert_eq!(session.last_response().unwrap().document_id, "doc1");
    }

    #[tokio::test]
    async fn test_upload_unsupported_message() {
        let mut session = CaptureSession::new();
        session.select_file(picked());
        session
            .upload(&FixedSubmitter(Err(UploadError::UnsupportedDocumentType)))
            .await;
        assert_eq!(session.phase(), CapturePhase::Error);
        assert_eq!(
            session.error_message(),
            Some("This type of document is not supported. Please upload a valid ID document.")
        );
    }

    #[test]
    fn test_loading_state() {
        let mut session = CaptureSession::new();
        session.select_file(picked());
        let ticket = session.begin_upload().unwrap();
        assert_eq!(session.phase(), CapturePhase::Uploading);
        assert_eq!(session.upload_button(), ("Processing...", false));
        assert_eq!(ticket.file().name, "id.png");
    }

    #[test]
    fn test_stale_upload_result_is_discarded() {
        let mut session = CaptureSession::new();
        session.select_file(picked());
        let stale = session.begin_upload().unwrap();

        session.select_file(SelectedFile::from_picker("new.png", "image/png", vec![4]));
        assert!(!session.finish_upload(stale, Err(UploadError::InvalidFileType)));
        assert_eq!(session.status(), UploadStatus::Idle);
        assert_eq!(session.error_message(), None);

        let current = session.begin_upload().unwrap();
        assert!(session.finish_upload(current, Ok(response())));
        assert_eq!(session.status(), UploadStatus::Success);
    }

    #[tokio::test]
    async fn test_retake_restarts_camera() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.start_camera(&camera).await.unwrap();
        session.camera_ready();
        session.capture_photo().unwrap();
        session
            .upload(&FixedSubmitter(Err(UploadError::DocumentNotRecognized)))
            .await;

        session.retake(&camera).await.unwrap();
        assert_eq!(session.phase(), CapturePhase::CameraActive);
        assert!(session.selected_image().is_none());
        assert_eq!(session.error_message(), None);
        assert_eq!(session.capture_button(), Some(CaptureButton::Preparing));
        assert_eq!(camera.live(), 2);
    }

    #[tokio::test]
    async fn test_retake_refused_for_picked_files() {
        let camera = FakeCamera::default();
        let mut session = CaptureSession::new();
        session.select_file(picked());
        assert_eq!(
            session.retake(&camera).await,
            Err(CaptureError::RetakeUnavailable)
        );
        assert_eq!(camera.live(), 0);

        session.select_new();
        assert_eq!(session.phase(), CapturePhase::IdleEmpty);
    }

    #[test]
    fn test_encode_jpeg_rejects_short_buffer() {
        let frame = Frame {
            width: 10,
            height: 10,
            rgba: vec![0; 12],
        };
        assert!(matches!(encode_jpeg(&frame, 95), Err(CameraError::Frame(_))));
    }

    #[tokio::test]
    async fn test_from_path_detects_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        let frame = Frame {
            width: 2,
            height: 2,
            rgba: vec![10; 16],
        };
        std::fs::write(&path, encode_jpeg(&frame, 80).unwrap()).unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "scan.bin");
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.origin, FileOrigin::Picker);

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello").unwrap();
        let file = SelectedFile::from_path(&text).await.unwrap();
        assert_eq!(file.mime_type, "application/octet-stream");
    }
}
