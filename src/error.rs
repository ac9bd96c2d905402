use std::fmt;

#[derive(Debug)]
pub enum BannerPressError {
    /// Caller input rejected before any file I/O; the message is user facing.
    Validation(String),
    InvalidRegion(String),
    Layout(String),
    Font(String),
    Image(String),
    Io(std::io::Error),
}

impl fmt::Display for BannerPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BannerPressError::Validation(message) => write!(f, "{}", message),
            BannerPressError::InvalidRegion(message) => write!(f, "invalid region: {}", message),
            BannerPressError::Layout(message) => write!(f, "layout error: {}", message),
            BannerPressError::Font(message) => write!(f, "font error: {}", message),
            BannerPressError::Image(message) => write!(f, "image error: {}", message),
            BannerPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl BannerPressError {
    /// Copy of this error with the same variant. An `Io` error keeps its kind
    /// and message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            BannerPressError::Validation(message) => BannerPressError::Validation(message.clone()),
            BannerPressError::InvalidRegion(message) => {
                BannerPressError::InvalidRegion(message.clone())
            }
            BannerPressError::Layout(message) => BannerPressError::Layout(message.clone()),
            BannerPressError::Font(message) => BannerPressError::Font(message.clone()),
            BannerPressError::Image(message) => BannerPressError::Image(message.clone()),
            BannerPressError::Io(err) => {
                BannerPressError::Io(std::io::Error::new(err.kind(), err.to_string()))
            }
        }
    }
}

impl std::error::Error for BannerPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BannerPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BannerPressError {
    fn from(value: std::io::Error) -> Self {
        BannerPressError::Io(value)
    }
}

impl From<image::ImageError> for BannerPressError {
    fn from(value: image::ImageError) -> Self {
        match value {
            image::ImageError::IoError(err) => BannerPressError::Io(err),
            other => BannerPressError::Image(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BannerPressError {
    fn from(value: serde_json::Error) -> Self {
        BannerPressError::Layout(format!("malformed layout json: {value}"))
    }
}
