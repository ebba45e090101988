//! Final packaging: stream the bundle tree into a zip or tar.gz without
//! an intermediate copy, then replace the directory with the archive.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use airlift_core::OutputFormat;
use airlift_util::error::AirliftError;

/// Package `dir` according to `format`.
///
/// For `Directory` this is a no-op returning the directory itself. For
/// archives the tree is streamed into `<dir>.zip` / `<dir>.tar.gz` and
/// the directory is removed once the archive is fully written.
pub fn package(dir: &Path, format: OutputFormat) -> miette::Result<PathBuf> {
    match format {
        OutputFormat::Directory => Ok(dir.to_path_buf()),
        OutputFormat::TarGz => {
            let dest = dir.with_extension("tar.gz");
            let file = std::fs::File::create(&dest).map_err(AirliftError::Io)?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            builder
                .append_dir_all(".", dir)
                .map_err(AirliftError::Io)?;
            let encoder = builder.into_inner().map_err(AirliftError::Io)?;
            let mut file = encoder.finish().map_err(AirliftError::Io)?;
            file.flush().map_err(AirliftError::Io)?;
            std::fs::remove_dir_all(dir).map_err(AirliftError::Io)?;
            Ok(dest)
        }
        OutputFormat::Zip => {
            let dest = dir.with_extension("zip");
            let file = std::fs::File::create(&dest).map_err(AirliftError::Io)?;
            let mut writer = zip::ZipWriter::new(file);
            let options: zip::write::SimpleFileOptions =
                zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated);
            add_dir_to_zip(&mut writer, dir, dir, options)?;
            writer
                .finish()
                .map_err(|e| AirliftError::Io(std::io::Error::other(e)))?;
            std::fs::remove_dir_all(dir).map_err(AirliftError::Io)?;
            Ok(dest)
        }
    }
}

fn add_dir_to_zip(
    writer: &mut zip::ZipWriter<std::fs::File>,
    root: &Path,
    current: &Path,
    options: zip::write::SimpleFileOptions,
) -> miette::Result<()> {
    let entries = std::fs::read_dir(current).map_err(AirliftError::Io)?;
    for entry in entries {
        let entry = entry.map_err(AirliftError::Io)?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| AirliftError::Io(std::io::Error::other("path outside bundle root")))?
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            writer
                .add_directory(format!("{relative}/"), options)
                .map_err(|e| AirliftError::Io(std::io::Error::other(e)))?;
            add_dir_to_zip(writer, root, &path, options)?;
        } else {
            writer
                .start_file(relative, options)
                .map_err(|e| AirliftError::Io(std::io::Error::other(e)))?;
            let mut file = std::fs::File::open(&path).map_err(AirliftError::Io)?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).map_err(AirliftError::Io)?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n]).map_err(AirliftError::Io)?;
            }
        }
    }
    Ok(())
}
