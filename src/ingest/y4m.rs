//! YUV4MPEG2 (`.y4m`) file source.
//!
//! Uncompressed and trivially seekable, y4m is what `ffmpeg -i in.mp4 out.y4m`
//! produces without any codec library on our side. Supported layouts are
//! 4:4:4, the 4:2:0 variants and mono, 8-bit only.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::normalize::{planar_to_rgb, Chroma};
use super::{FrameRate, FrameSource, StreamInfo};
use crate::frame::Frame;

const STREAM_MAGIC: &str = "YUV4MPEG2";
const FRAME_MAGIC: &[u8] = b"FRAME";
const MAX_HEADER_LEN: usize = 1024;

pub struct Y4mSource<R> {
    reader: R,
    info: StreamInfo,
    chroma: Chroma,
    frame_len: usize,
    frames_read: u64,
}

impl Y4mSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open video file {}", path.display()))?;
        let source = Self::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid y4m file {}", path.display()))?;
        log::info!(
            "Y4mSource: opened {} ({}x{} @ {} fps)",
            path.display(),
            source.info.width,
            source.info.height,
            source.info.fps
        );
        Ok(source)
    }
}

impl<R: BufRead> Y4mSource<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let line = read_header_line(&mut reader)?
            .ok_or_else(|| anyhow!("empty stream, missing {} header", STREAM_MAGIC))?;
        let header = String::from_utf8(line).map_err(|_| anyhow!("stream header is not ASCII"))?;
        let (info, chroma) = parse_stream_header(&header)?;
        let frame_len = chroma.frame_len(info.width, info.height)?;
        Ok(Self {
            reader,
            info,
            chroma,
            frame_len,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<R: BufRead + Send> FrameSource for Y4mSource<R> {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(line) = read_header_line(&mut self.reader)? else {
            return Ok(None);
        };
        if !line.starts_with(FRAME_MAGIC) {
            return Err(anyhow!(
                "frame {}: expected FRAME marker",
                self.frames_read
            ));
        }

        let mut planar = vec![0u8; self.frame_len];
        self.reader
            .read_exact(&mut planar)
            .with_context(|| format!("frame {}: truncated frame data", self.frames_read))?;

        let index = self.frames_read;
        self.frames_read += 1;
        let rgb = planar_to_rgb(&planar, self.info.width, self.info.height, self.chroma)?;
        Ok(Some(Frame::new(rgb, self.info.width, self.info.height, index)?))
    }
}

/// One `\n`-terminated header line without the terminator; `None` at clean EOF.
fn read_header_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(anyhow!("unterminated or oversized y4m header line"));
    }
    line.pop();
    Ok(Some(line))
}

fn parse_stream_header(header: &str) -> Result<(StreamInfo, Chroma)> {
    let mut tokens = header.split(' ').filter(|t| !t.is_empty());
    if tokens.next() != Some(STREAM_MAGIC) {
        return Err(anyhow!("missing {} signature", STREAM_MAGIC));
    }

    let mut width = None;
    let mut height = None;
    let mut fps = FrameRate::new(25, 1);
    let mut chroma = Chroma::C420;

    for token in tokens {
        let mut chars = token.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('W') => width = Some(parse_dim(value, "width")?),
            Some('H') => height = Some(parse_dim(value, "height")?),
            Some('F') => fps = parse_rate(value)?,
            Some('C') => chroma = parse_chroma(value)?,
            // Interlacing, aspect ratio and extensions do not change decoding.
            _ => {}
        }
    }

    let width = width.ok_or_else(|| anyhow!("missing W parameter"))?;
    let height = height.ok_or_else(|| anyhow!("missing H parameter"))?;
    Ok((StreamInfo { width, height, fps }, chroma))
}

fn parse_dim(value: &str, name: &str) -> Result<u32> {
    let v: u32 = value
        .parse()
        .map_err(|_| anyhow!("invalid {} '{}'", name, value))?;
    if v == 0 {
        return Err(anyhow!("{} must be greater than zero", name));
    }
    Ok(v)
}

fn parse_rate(value: &str) -> Result<FrameRate> {
    let (num, den) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid frame rate '{}'", value))?;
    let num: u32 = num
        .parse()
        .map_err(|_| anyhow!("invalid frame rate '{}'", value))?;
    let den: u32 = den
        .parse()
        .map_err(|_| anyhow!("invalid frame rate '{}'", value))?;
    if num == 0 || den == 0 {
        return Err(anyhow!("frame rate must be non-zero, got '{}'", value));
    }
    Ok(FrameRate::new(num, den))
}

fn parse_chroma(value: &str) -> Result<Chroma> {
    match value {
        "444" => Ok(Chroma::C444),
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(Chroma::C420),
        "mono" => Ok(Chroma::Mono),
        other => Err(anyhow!("unsupported y4m colorspace C{}", other)),
    }
}
