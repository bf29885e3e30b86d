use std::path::PathBuf;

use crate::random::random_string;

/// A random path in the temporary directory, nothing is created.
pub fn temp_file() -> PathBuf {
    let path = std::env::temp_dir();
    let file_name = random_string(16);
    path.join(file_name)
}
