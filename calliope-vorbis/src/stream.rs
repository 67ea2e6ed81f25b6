//! Streaming Ogg/Vorbis front-end.
//!
//! [`OggVorbisReader`] wires the page reader, the packet framer and the
//! Vorbis decoder together: pages in, interleaved f32 samples out. Granule
//! positions drive end-of-stream trimming and sample-exact seeking.

use calliope_core::error::Error as CoreError;
use calliope_core::io::{ByteSource, CancelToken, SampleSink};
use calliope_ogg::reader::Resync;
use calliope_ogg::{seek, OggPageReader, PacketFramer, PageFlags, NO_GRANULE};
use tracing::{debug, warn};

use crate::error::{Result, VorbisError};
use crate::header::{VorbisComments, VorbisInfo};
use crate::{VorbisDecoder, CLIP_CEILING};

/// A pull-style decoder for one Ogg-encapsulated Vorbis stream.
pub struct OggVorbisReader<S> {
    pages: OggPageReader<S>,
    framer: PacketFramer,
    decoder: VorbisDecoder,
    cancel: CancelToken,
    info: VorbisInfo,
    comments: VorbisComments,
    /// Index of the first audio page, right after the header pages.
    first_audio_page: u32,
    /// Granule position after the most recently decoded packet.
    decoded_granule: u64,
    /// Frames still to drop before delivering samples (seek lead-in).
    discard: u64,
    /// Packets still to drop before decoding (seek positioning).
    skip_packets: usize,
    end_of_stream: bool,
    clip: bool,
    has_clipped: bool,
    total: Option<u64>,
}

impl<S: ByteSource> OggVorbisReader<S> {
    /// Open a stream and consume its three header packets.
    pub fn new(source: S) -> Result<Self> {
        Self::with_cancel(source, CancelToken::new())
    }

    /// Like [`new`](OggVorbisReader::new), with a caller-supplied
    /// cancellation token checked at every page fetch and packet boundary.
    pub fn with_cancel(source: S, cancel: CancelToken) -> Result<Self> {
        let mut pages = OggPageReader::new(source);
        let mut framer = PacketFramer::new();
        let mut decoder = VorbisDecoder::new();

        let mut last_header_page = 0;
        while !decoder.is_ready() {
            cancel.check()?;
            let page = match pages.read_next_page() {
                Ok(page) => page,
                Err(CoreError::EndOfStream) => {
                    return Err(VorbisError::InvalidHeader(
                        "stream ended before the header packets completed".into(),
                    ))
                }
                Err(err) => return Err(err.into()),
            };
            last_header_page = page.page_index;
            for packet in framer.submit_page(&page) {
                if decoder.is_ready() {
                    // Vorbis requires the setup header to end its page.
                    return Err(VorbisError::InvalidHeader(
                        "audio packet on a header page".into(),
                    ));
                }
                decoder.submit_header_packet(packet.data())?;
            }
        }

        let info = decoder.info().cloned().unwrap_or_default();
        let comments = decoder.comments().cloned().unwrap_or_default();
        debug!(
            channels = info.channels,
            sample_rate = info.sample_rate,
            vendor = %comments.vendor,
            "vorbis stream opened"
        );

        Ok(Self {
            pages,
            framer,
            decoder,
            cancel,
            info,
            comments,
            first_audio_page: last_header_page + 1,
            decoded_granule: 0,
            discard: 0,
            skip_packets: 0,
            end_of_stream: false,
            clip: true,
            has_clipped: false,
            total: None,
        })
    }

    /// Stream parameters.
    pub fn info(&self) -> &VorbisInfo {
        &self.info
    }

    /// Stream metadata.
    pub fn comments(&self) -> &VorbisComments {
        &self.comments
    }

    /// Granule position after the most recently decoded packet.
    pub fn position(&self) -> u64 {
        self.decoded_granule
    }

    /// Enable or disable clamping of output samples to the 16-bit-safe
    /// range `±0.99999994`. Enabled by default.
    pub fn set_clip_samples(&mut self, clip: bool) {
        self.clip = clip;
    }

    /// Whether any sample was clamped so far.
    pub fn has_clipped(&self) -> bool {
        self.has_clipped
    }

    /// Take the pending page-resynchronization event, if any.
    pub fn take_resync(&mut self) -> Option<Resync> {
        self.pages.take_resync()
    }

    /// Total length of the stream in samples per channel.
    ///
    /// Requires a seekable source; the result is cached.
    pub fn total_samples(&mut self) -> Result<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        if !self.pages.can_seek() {
            return Err(VorbisError::Unsupported(
                "total length needs a seekable source".into(),
            ));
        }
        let total = seek::total_granules(&mut self.pages)?;
        self.total = Some(total);
        Ok(total)
    }

    /// Decode forward until at least one frame was written to `sink`.
    ///
    /// Returns the number of frames (samples per channel) written, or 0 at
    /// the end of the stream. Damaged pages and packets are skipped.
    pub fn read_samples(&mut self, sink: &mut dyn SampleSink) -> Result<usize> {
        if self.end_of_stream {
            return Ok(0);
        }
        loop {
            self.cancel.check()?;
            let page = match self.pages.read_next_page() {
                Ok(page) => page,
                Err(CoreError::EndOfStream) => {
                    self.end_of_stream = true;
                    return Ok(0);
                }
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "skipping damaged page");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let final_page = page.flags.contains(PageFlags::ENDS_STREAM);

            let mut written = 0usize;
            for packet in self.framer.submit_page(&page) {
                self.cancel.check()?;
                if self.skip_packets > 0 {
                    self.skip_packets -= 1;
                    continue;
                }
                let mut samples = match self.decoder.decode_audio(packet.data()) {
                    Ok(samples) => samples,
                    Err(err) => {
                        // A bad packet costs itself, nothing more.
                        warn!(error = %err, "skipping undecodable audio packet");
                        continue;
                    }
                };

                // Granule trimming: the final page says how many samples
                // the stream really holds.
                let mut frames = samples.len() as u64;
                if packet.ends_stream && packet.page_granule != NO_GRANULE {
                    let allowed = packet.page_granule.saturating_sub(self.decoded_granule);
                    if frames > allowed {
                        samples.truncate(allowed as usize);
                        frames = allowed;
                    }
                }
                self.decoded_granule += frames;

                // Seek lead-in is decoded but withheld.
                if self.discard > 0 {
                    let drop = self.discard.min(frames);
                    samples.skip_front(drop as usize);
                    self.discard -= drop;
                }

                let frames = samples.len();
                if frames > 0 {
                    let channels = samples.channels();
                    let out = sink.get_writable(frames * channels);
                    for frame in 0..frames {
                        for ch in 0..channels {
                            let mut value = samples.channel(ch)[frame];
                            if self.clip && value.abs() > CLIP_CEILING {
                                value = value.clamp(-CLIP_CEILING, CLIP_CEILING);
                                self.has_clipped = true;
                            }
                            out[frame * channels + ch] = value;
                        }
                    }
                    sink.advance(frames * channels);
                    written += frames;
                }
            }

            if final_page {
                self.end_of_stream = true;
                return Ok(written);
            }
            if written > 0 {
                return Ok(written);
            }
        }
    }

    /// Seek so the next delivered sample sits at granule `target`.
    ///
    /// Returns the granule position decoding actually resumes from (at or
    /// before `target`); the lead-in up to `target` is decoded internally
    /// and discarded.
    pub fn seek_to_sample(&mut self, target: u64) -> Result<u64> {
        if !self.pages.can_seek() {
            return Err(VorbisError::Unsupported(
                "seeking needs a seekable source".into(),
            ));
        }
        let point = {
            let decoder = &self.decoder;
            seek::seek_to(&mut self.pages, target, 1, self.first_audio_page, |packet| {
                decoder
                    .packet_sample_count(packet.data(), packet.is_last_in_page)
                    .ok()
            })?
        };
        debug!(
            granule_target = target,
            page = point.start_page,
            skip = point.skip_packets,
            granule = point.granule,
            "seek resolved"
        );

        self.pages.position_at_page(point.start_page)?;
        self.framer.reset();
        self.decoder.reset();
        self.skip_packets = point.skip_packets;
        self.decoded_granule = point.granule;
        self.discard = target - point.granule;
        self.end_of_stream = false;
        Ok(point.granule)
    }
}
