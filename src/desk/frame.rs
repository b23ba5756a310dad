//! Camera frames and the decoders that read QR payloads out of them.

/// One capture from a desk's scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The device already decoded the QR image to text (handheld scanners and
    /// phone camera libraries both do this).
    Text(String),

    /// Raw payload bytes as reported by a hardware scanner.
    Bytes(Vec<u8>),

    /// An undecoded greyscale image.
    Image {
        width: u32,
        height: u32,
        luma: Vec<u8>,
    },
}

/// Extracts the QR payload from a frame.
///
/// Returns `None` when the frame holds no readable code; most camera frames don't.
pub trait FrameDecoder {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Reads payloads that the capture device has already decoded.
///
/// Image frames need a device-specific decoder and yield `None` here.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadDecoder;

impl FrameDecoder for PayloadDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let text = match frame {
            Frame::Text(text) => text.as_str(),
            Frame::Bytes(bytes) => std::str::from_utf8(bytes).ok()?,
            Frame::Image { .. } => return None,
        };
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_are_trimmed() {
        let decoded = PayloadDecoder.decode(&Frame::Text("  qr-abc\n".to_string()));
        assert_eq!(decoded.as_deref(), Some("qr-abc"));
    }

    #[test]
    fn blank_and_binary_frames_yield_nothing() {
        assert_eq!(PayloadDecoder.decode(&Frame::Text("   ".to_string())), None);
        assert_eq!(PayloadDecoder.decode(&Frame::Bytes(vec![0xff, 0xfe])), None);
        assert_eq!(
            PayloadDecoder.decode(&Frame::Image {
                width: 2,
                height: 1,
                luma: vec![0, 255],
            }),
            None
        );
    }

    #[test]
    fn utf8_bytes_decode() {
        let decoded = PayloadDecoder.decode(&Frame::Bytes(br#"{"type":"gift"}"#.to_vec()));
        assert_eq!(decoded.as_deref(), Some(r#"{"type":"gift"}"#));
    }
}
