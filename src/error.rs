// Error types. Every variant states *where* things went wrong.
use thiserror::Error;

/// Failures of the window, the raster surface, or the export path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error("Snapshot image error: {0}")]
    Image(#[from] image::ImageError), // PNG encode/decode of the surface failed
    #[error("Export error: {0}")]
    Io(#[from] std::io::Error), // Writing an exported PNG failed
}

/// Everything that can end a solve attempt. Each one is shown to the user as
/// a short message in the result area; none of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// Precondition: nothing has been drawn yet.
    #[error("Please draw a mathematical expression on the canvas first!")]
    EmptyCanvas,

    /// Configuration: no API key was supplied.
    #[error(
        "API key not configured. Please set your Gemini API key (GEMINI_API_KEY or api_key in the config file)."
    )]
    MissingApiKey,

    /// The endpoint answered with a non-success status.
    #[error("API request failed. {}", describe_status(*status, message.as_deref()))]
    Http { status: u16, message: Option<String> },

    /// The request never produced a response.
    #[error("API request failed. Network error - {0}")]
    Transport(String),

    /// The response did not carry `candidates[0].content.parts[0].text`.
    #[error(
        "No solution received from AI. The handwriting might be unclear or the image too complex."
    )]
    NoSolution,

    #[error("Could not encode the drawing: {0}")]
    Encode(String),
}

/// Human-readable category for an HTTP status code.
fn describe_status(status: u16, message: Option<&str>) -> String {
    match status {
        400 => "Bad request - please check your input.".to_string(),
        403 => "Access denied - please check your API key.".to_string(),
        429 => "Rate limit exceeded - please try again later.".to_string(),
        s if s >= 500 => "Server error - please try again later.".to_string(),
        s => format!("HTTP {s}: {}", message.unwrap_or("Unknown error")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categories() {
        let msg = |status| SolveError::Http { status, message: None }.to_string();
        assert_eq!(msg(400), "API request failed. Bad request - please check your input.");
        assert_eq!(msg(403), "API request failed. Access denied - please check your API key.");
        assert_eq!(msg(429), "API request failed. Rate limit exceeded - please try again later.");
        assert_eq!(msg(503), "API request failed. Server error - please try again later.");
        assert_eq!(msg(404), "API request failed. HTTP 404: Unknown error");
    }

    #[test]
    fn other_status_carries_endpoint_message() {
        let err = SolveError::Http {
            status: 401,
            message: Some("API key expired".into()),
        };
        assert_eq!(err.to_string(), "API request failed. HTTP 401: API key expired");
    }
}
