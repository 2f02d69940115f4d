use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::frame::Frame;

pub const SEGMENT_EXT: &str = "mjpeg";

/// Process-wide "current day" marker, shared by every connection handler via
/// an explicit `Arc` handle. Rollover is detected lazily by whichever handler
/// processes a frame after midnight; there is no dedicated timer.
pub struct DayTracker {
    current: Mutex<NaiveDate>,
}

impl DayTracker {
    pub fn new(day: NaiveDate) -> Self {
        Self { current: Mutex::new(day) }
    }

    pub fn startup() -> Self {
        Self::new(Local::now().date_naive())
    }

    /// Moves the marker to `today`. Returns whether it changed; only the
    /// first caller after midnight sees `true`.
    pub fn advance_to(&self, today: NaiveDate) -> bool {
        let mut current = self.current.lock().unwrap();
        if *current != today {
            *current = today;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> NaiveDate {
        *self.current.lock().unwrap()
    }
}

/// One output video file: a JPEG elementary stream, one image per frame, with
/// dimensions fixed by the first frame written.
pub struct VideoSegment {
    path: PathBuf,
    opened_day: NaiveDate,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    frames_written: u64,
    jpeg_quality: u8,
}

impl VideoSegment {
    /// Opens `<root>/<Mon-DD-YYYY>/cam_<id>/started_at_<HH.MM>.mjpeg`, creating
    /// the directories if absent. Dimensions come from `first_frame`; nothing
    /// is written yet.
    pub fn create(
        root: &Path,
        camera_id: u32,
        opened_at: DateTime<Local>,
        first_frame: &Frame,
        jpeg_quality: u8,
    ) -> Result<Self> {
        let opened_day = opened_at.date_naive();
        let dir = root
            .join(opened_at.format("%b-%d-%Y").to_string())
            .join(format!("cam_{camera_id}"));
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!(
            "started_at_{}.{SEGMENT_EXT}",
            opened_at.format("%H.%M")
        ));
        info!(
            "Opening video segment {} ({}x{})",
            path.display(),
            first_frame.width,
            first_frame.height
        );
        let file = File::create(&path)?;

        Ok(Self {
            path,
            opened_day,
            writer: BufWriter::new(file),
            width: first_frame.width,
            height: first_frame.height,
            frames_written: 0,
            jpeg_quality,
        })
    }

    /// Appends one frame. A frame whose dimensions differ from the segment's
    /// is skipped so every frame in the file shares the first frame's size.
    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            warn!(
                "Skipping {}x{} frame for segment {} sized {}x{}",
                frame.width,
                frame.height,
                self.path.display(),
                self.width,
                self.height
            );
            return Ok(());
        }
        let jpeg = frame.to_jpeg(self.jpeg_quality)?;
        self.writer.write_all(&jpeg)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        debug!(
            "Closed video segment {} after {} frames",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn opened_day(&self) -> NaiveDate {
        self.opened_day
    }
}

/// Per-connection recording state machine: closes the open segment on day
/// rollover, opens a segment lazily on the first frame, appends in arrival
/// order, and releases the file on teardown.
pub struct VideoRecorder {
    camera_id: u32,
    root: PathBuf,
    day: Arc<DayTracker>,
    jpeg_quality: u8,
    segment: Option<VideoSegment>,
}

impl VideoRecorder {
    pub fn new(camera_id: u32, root: PathBuf, day: Arc<DayTracker>, jpeg_quality: u8) -> Self {
        Self { camera_id, root, day, jpeg_quality, segment: None }
    }

    /// Day-rollover check, run before each frame's side effects. The shared
    /// marker is advanced by the first handler that notices midnight passed;
    /// every other handler still rotates because its open segment carries the
    /// day it was opened on.
    pub fn rotate_if_new_day(&mut self, today: NaiveDate) -> Result<()> {
        let marker_moved = self.day.advance_to(today);
        let segment_stale = self
            .segment
            .as_ref()
            .is_some_and(|segment| segment.opened_day() != today);

        if marker_moved || segment_stale {
            if let Some(segment) = self.segment.take() {
                info!(
                    "Day changed, rotating video segment for camera {}",
                    self.camera_id
                );
                segment.finish()?;
            }
        }
        Ok(())
    }

    /// Appends a frame, opening a segment sized to it first if none is open.
    pub fn write(&mut self, frame: &Frame, now: DateTime<Local>) -> Result<()> {
        if self.segment.is_none() {
            self.segment = Some(VideoSegment::create(
                &self.root,
                self.camera_id,
                now,
                frame,
                self.jpeg_quality,
            )?);
        }
        if let Some(segment) = self.segment.as_mut() {
            segment.append(frame)?;
        }
        Ok(())
    }

    /// Flushes and drops the open segment, if any. Called on every teardown
    /// path, regardless of why the connection ended.
    pub fn close(&mut self) {
        if let Some(segment) = self.segment.take() {
            let path = segment.path().to_path_buf();
            if let Err(e) = segment.finish() {
                warn!(
                    "Failed to close video segment {} for camera {}: {}",
                    path.display(),
                    self.camera_id,
                    e
                );
            }
        }
    }

    pub fn segment_path(&self) -> Option<&Path> {
        self.segment.as_ref().map(VideoSegment::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid_frame(width: u32, height: u32, fill: u8) -> Frame {
        Frame::new(width, height, vec![fill; (width * height * 3) as usize])
    }

    fn local_time(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Local> {
        day.and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_local_timezone(Local)
            .single()
            .unwrap()
    }

    fn count_jpegs(bytes: &[u8]) -> usize {
        bytes.windows(2).filter(|pair| pair == &[0xFF, 0xD8]).count()
    }

    #[test]
    fn writes_frames_and_reads_back_dimensions() {
        let dir = TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut recorder =
            VideoRecorder::new(7, dir.path().to_path_buf(), Arc::new(DayTracker::new(day)), 85);

        let frame = solid_frame(64, 48, 120);
        for _ in 0..3 {
            recorder.write(&frame, local_time(day, 9, 30)).unwrap();
        }
        let path = recorder.segment_path().unwrap().to_path_buf();
        recorder.close();

        assert_eq!(
            path,
            dir.path()
                .join("Jan-15-2024")
                .join("cam_7")
                .join("started_at_09.30.mjpeg")
        );
        let bytes = fs::read(&path).unwrap();
        assert_eq!(count_jpegs(&bytes), 3);

        // decode the first image back out of the stream
        let second_start = bytes[2..]
            .windows(2)
            .position(|pair| pair == [0xFF, 0xD8])
            .map(|i| i + 2)
            .unwrap();
        let decoded = image::load_from_memory(&bytes[..second_start]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn day_rollover_closes_the_old_segment_and_opens_under_the_new_day() {
        let dir = TempDir::new().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let tracker = Arc::new(DayTracker::new(day1));
        let mut recorder = VideoRecorder::new(1, dir.path().to_path_buf(), tracker.clone(), 85);

        let frame = solid_frame(32, 24, 10);
        recorder.rotate_if_new_day(day1).unwrap();
        recorder.write(&frame, local_time(day1, 23, 59)).unwrap();
        let old_path = recorder.segment_path().unwrap().to_path_buf();

        recorder.rotate_if_new_day(day2).unwrap();
        assert!(recorder.segment_path().is_none(), "old segment must be closed");
        assert_eq!(tracker.current(), day2);
        assert_eq!(count_jpegs(&fs::read(&old_path).unwrap()), 1);

        recorder.write(&frame, local_time(day2, 0, 0)).unwrap();
        let new_path = recorder.segment_path().unwrap();
        assert!(new_path.starts_with(dir.path().join("Jan-16-2024")));
        assert_ne!(new_path, old_path);
        recorder.close();
    }

    #[test]
    fn every_camera_rotates_even_after_the_marker_already_moved() {
        let dir = TempDir::new().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let tracker = Arc::new(DayTracker::new(day1));

        let mut first = VideoRecorder::new(1, dir.path().to_path_buf(), tracker.clone(), 85);
        let mut second = VideoRecorder::new(2, dir.path().to_path_buf(), tracker.clone(), 85);

        let frame = solid_frame(32, 24, 77);
        first.write(&frame, local_time(day1, 12, 0)).unwrap();
        second.write(&frame, local_time(day1, 12, 0)).unwrap();

        // camera 1 notices midnight first and moves the shared marker
        first.rotate_if_new_day(day2).unwrap();
        assert!(first.segment_path().is_none());

        // camera 2's check still rotates its own stale segment
        second.rotate_if_new_day(day2).unwrap();
        assert!(second.segment_path().is_none());
    }

    #[test]
    fn mismatched_dimensions_are_skipped_not_written() {
        let dir = TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut recorder =
            VideoRecorder::new(4, dir.path().to_path_buf(), Arc::new(DayTracker::new(day)), 85);

        recorder.write(&solid_frame(64, 48, 1), local_time(day, 8, 0)).unwrap();
        recorder.write(&solid_frame(32, 24, 2), local_time(day, 8, 0)).unwrap();
        recorder.write(&solid_frame(64, 48, 3), local_time(day, 8, 0)).unwrap();
        let path = recorder.segment_path().unwrap().to_path_buf();
        recorder.close();

        assert_eq!(count_jpegs(&fs::read(&path).unwrap()), 2);
    }

    #[test]
    fn segment_directory_creation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let frame = solid_frame(16, 16, 5);

        let first = VideoSegment::create(dir.path(), 9, local_time(day, 10, 0), &frame, 85).unwrap();
        first.finish().unwrap();
        // same day and camera, later minute: same directories already exist
        let second = VideoSegment::create(dir.path(), 9, local_time(day, 10, 1), &frame, 85).unwrap();
        second.finish().unwrap();
    }
}
