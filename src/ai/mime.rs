/// Image container formats recognised by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
    Gif,
    Unknown,
}

impl ImageKind {
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes {
            [0x89, 0x50, 0x4E, 0x47, ..] => ImageKind::Png,
            [0xFF, 0xD8, 0xFF, ..] => ImageKind::Jpeg,
            [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => ImageKind::Webp,
            [0x47, 0x49, 0x46, 0x38, ..] => ImageKind::Gif,
            _ => ImageKind::Unknown,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
            ImageKind::Gif => "image/gif",
            ImageKind::Unknown => "application/octet-stream",
        }
    }

    /// File extension for saving; unknown payloads are saved as `.bin`.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
            ImageKind::Unknown => "bin",
        }
    }
}
