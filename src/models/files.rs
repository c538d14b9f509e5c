use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };

#[derive(Debug, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub filename: String,
    pub file_id: String,
    pub size: usize,
    pub upload_time: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileStatusResponse {
    pub file_id: String,
    pub status: String,
    pub available: bool,
}

fn default_instructions() -> Option<String> {
    Some("Analyze and summarize this text file".to_string())
}

#[derive(Debug, Deserialize)]
pub struct ProcessFileRequest {
    pub file_id: String,
    #[serde(default = "default_instructions")]
    pub processing_instructions: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessFileResponse {
    pub file_id: String,
    pub output_filename: String,
    pub processing_status: String,
    pub summary: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputFileInfo {
    pub filename: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputFileList {
    pub files: Vec<OutputFileInfo>,
}
