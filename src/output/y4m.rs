use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::FrameSink;
use crate::frame::Frame;
use crate::ingest::normalize::rgb_to_planar_444;
use crate::ingest::StreamInfo;

/// Writes 4:4:4 YUV4MPEG2 at the source's size and rate.
///
/// Frames that do not match the declared dimensions are rejected.
pub struct Y4mSink<W: Write> {
    writer: Option<W>,
    info: StreamInfo,
    frames_written: u64,
}

impl Y4mSink<BufWriter<File>> {
    pub fn create(path: &Path, info: StreamInfo) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create output video {}", path.display()))?;
        let sink = Self::from_writer(BufWriter::new(file), info)?;
        log::info!(
            "Y4mSink: writing {} ({}x{} @ {} fps)",
            path.display(),
            info.width,
            info.height,
            info.fps
        );
        Ok(sink)
    }
}

impl<W: Write> Y4mSink<W> {
    pub fn from_writer(mut writer: W, info: StreamInfo) -> Result<Self> {
        writeln!(
            writer,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444",
            info.width, info.height, info.fps.num, info.fps.den
        )
        .context("failed to write y4m stream header")?;
        Ok(Self {
            writer: Some(writer),
            info,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Finish and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| anyhow!("y4m output already finished"))?;
        writer.flush()?;
        Ok(writer)
    }
}

impl<W: Write> FrameSink for Y4mSink<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(anyhow!(
                "frame {} is {}x{}, output expects {}x{}",
                frame.index,
                frame.width,
                frame.height,
                self.info.width,
                self.info.height
            ));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("y4m output already finished"))?;
        writer.write_all(b"FRAME\n")?;
        writer.write_all(&rgb_to_planar_444(frame.pixels()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().context("failed to flush output video")?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for Y4mSink<W> {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::error!("failed to flush output video on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameRate, FrameSource, Y4mSource};
    use std::io::Cursor;

    fn info() -> StreamInfo {
        StreamInfo {
            width: 4,
            height: 2,
            fps: FrameRate::new(30000, 1001),
        }
    }

    #[test]
    fn output_reads_back_as_y4m() -> Result<()> {
        let mut sink = Y4mSink::from_writer(Vec::new(), info())?;
        sink.write_frame(&Frame::filled(4, 2, 0, [128, 128, 128])?)?;
        sink.write_frame(&Frame::filled(4, 2, 1, [0, 0, 0])?)?;
        assert_eq!(sink.frames_written(), 2);
        let bytes = sink.into_inner()?;

        let mut source = Y4mSource::from_reader(Cursor::new(bytes))?;
        assert_eq!(source.info(), info());
        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.pixel(3, 1), Some([128, 128, 128]));
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.pixel(0, 0), Some([0, 0, 0]));
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_mismatched_frames_and_writes_after_finish() -> Result<()> {
        let mut sink = Y4mSink::from_writer(Vec::new(), info())?;
        assert!(sink.write_frame(&Frame::filled(2, 2, 0, [0, 0, 0])?).is_err());
        sink.finish()?;
        sink.finish()?;
        assert!(sink.write_frame(&Frame::filled(4, 2, 0, [0, 0, 0])?).is_err());
        Ok(())
    }
}
