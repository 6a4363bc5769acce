mod filesystem;

pub use filesystem::{
  extension, format_file_size, generate_file_name, mime_type, LocalFileStorage, StoredFile,
  UploadError, ALLOWED_TYPES,
};
