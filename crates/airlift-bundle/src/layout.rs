//! On-disk layout of the bundle: the flat `packages/` directory plus
//! ecosystem-idiomatic overlays.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use airlift_core::Ecosystem;
use airlift_fetch::ArtifactResult;
use airlift_util::error::AirliftError;
use airlift_util::fs::ensure_dir;
use airlift_util::hash::{sha256_bytes, sha256_file};

/// Copy one completed artifact (and auxiliaries) into the flat layout,
/// returning the flat file paths written.
pub fn place_flat(output: &Path, result: &ArtifactResult) -> miette::Result<Vec<PathBuf>> {
    let packages = output.join("packages");
    ensure_dir(&packages).map_err(AirliftError::Io)?;
    let mut written = Vec::new();
    for file in &result.files {
        let dest = packages.join(&file.file_name);
        std::fs::copy(&file.path, &dest).map_err(AirliftError::Io)?;
        written.push(dest);
    }
    Ok(written)
}

/// Maven overlay: `packages/m2repo/{groupPath}/{artifact}/{version}/`.
pub fn place_maven(output: &Path, result: &ArtifactResult) -> miette::Result<()> {
    let artifact = &result.artifact;
    let Some((group, artifact_id)) = artifact.name.split_once(':') else {
        return Ok(());
    };
    let dir = output
        .join("packages")
        .join("m2repo")
        .join(group.replace('.', "/"))
        .join(artifact_id)
        .join(&artifact.version);
    ensure_dir(&dir).map_err(AirliftError::Io)?;
    for file in &result.files {
        std::fs::copy(&file.path, dir.join(&file.file_name)).map_err(AirliftError::Io)?;
    }
    Ok(())
}

/// Docker overlay: `packages/images/{name}_{tag}.tar`.
pub fn place_docker(output: &Path, result: &ArtifactResult) -> miette::Result<()> {
    let dir = output.join("packages").join("images");
    ensure_dir(&dir).map_err(AirliftError::Io)?;
    for file in &result.files {
        std::fs::copy(&file.path, dir.join(&file.file_name)).map_err(AirliftError::Io)?;
    }
    Ok(())
}

/// yum overlay: `packages/repo/` holding the rpms plus a regenerated
/// `repodata/` pair (primary.xml.gz and a repomd.xml pointing at it), so
/// the directory works as a local repository without network metadata.
pub fn build_yum_repo(output: &Path, results: &[&ArtifactResult]) -> miette::Result<()> {
    let repo = output.join("packages").join("repo");
    let repodata = repo.join("repodata");
    ensure_dir(&repodata).map_err(AirliftError::Io)?;

    let mut entries = String::new();
    let mut count = 0usize;
    for result in results {
        let artifact = &result.artifact;
        let Some(rpm) = result
            .files
            .iter()
            .find(|f| f.file_name.ends_with(".rpm"))
        else {
            continue;
        };
        let dest = repo.join(&rpm.file_name);
        std::fs::copy(&rpm.path, &dest).map_err(AirliftError::Io)?;

        let sha256 = sha256_file(&dest).map_err(AirliftError::Io)?;
        let size = std::fs::metadata(&dest).map_err(AirliftError::Io)?.len();
        let (epoch, version, release) = split_evr(&artifact.version);
        entries.push_str(&format!(
            r#"<package type="rpm">
  <name>{}</name>
  <arch>{}</arch>
  <version epoch="{epoch}" ver="{version}" rel="{release}"/>
  <checksum type="sha256" pkgid="YES">{sha256}</checksum>
  <size package="{size}"/>
  <location href="{}"/>
</package>
"#,
            artifact.name,
            artifact.architecture.as_deref().unwrap_or("noarch"),
            rpm.file_name,
        ));
        count += 1;
    }

    let primary = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{count}\">\n{entries}</metadata>\n"
    );
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(primary.as_bytes())
        .map_err(AirliftError::Io)?;
    let primary_gz = encoder.finish().map_err(AirliftError::Io)?;
    let primary_sha = sha256_bytes(&primary_gz);
    let primary_name = format!("{primary_sha}-primary.xml.gz");
    airlift_util::fs::atomic_write(&repodata.join(&primary_name), &primary_gz)
        .map_err(AirliftError::Io)?;

    let repomd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{primary_sha}</checksum>
    <location href="repodata/{primary_name}"/>
    <size>{}</size>
  </data>
</repomd>
"#,
        primary_gz.len()
    );
    airlift_util::fs::atomic_write(&repodata.join("repomd.xml"), repomd.as_bytes())
        .map_err(AirliftError::Io)?;
    Ok(())
}

/// apt overlay: `packages/repo/` with the debs plus regenerated
/// `Packages`, `Packages.gz` and `Release` records.
pub fn build_apt_repo(output: &Path, results: &[&ArtifactResult]) -> miette::Result<()> {
    let repo = output.join("packages").join("repo");
    ensure_dir(&repo).map_err(AirliftError::Io)?;

    let mut records = String::new();
    for result in results {
        let artifact = &result.artifact;
        let Some(deb) = result
            .files
            .iter()
            .find(|f| f.file_name.ends_with(".deb"))
        else {
            continue;
        };
        let dest = repo.join(&deb.file_name);
        std::fs::copy(&deb.path, &dest).map_err(AirliftError::Io)?;
        let sha256 = sha256_file(&dest).map_err(AirliftError::Io)?;
        let size = std::fs::metadata(&dest).map_err(AirliftError::Io)?.len();
        records.push_str(&format!(
            "Package: {}\nVersion: {}\nArchitecture: {}\nFilename: {}\nSize: {size}\nSHA256: {sha256}\n\n",
            artifact.name,
            artifact.version,
            artifact.architecture.as_deref().unwrap_or("all"),
            deb.file_name,
        ));
    }

    airlift_util::fs::atomic_write(&repo.join("Packages"), records.as_bytes())
        .map_err(AirliftError::Io)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(records.as_bytes())
        .map_err(AirliftError::Io)?;
    let gz = encoder.finish().map_err(AirliftError::Io)?;
    airlift_util::fs::atomic_write(&repo.join("Packages.gz"), &gz).map_err(AirliftError::Io)?;

    let release = "Origin: airlift\nLabel: airlift offline bundle\nSuite: local\nComponents: main\nDescription: locally assembled offline repository\n";
    airlift_util::fs::atomic_write(&repo.join("Release"), release.as_bytes())
        .map_err(AirliftError::Io)?;
    Ok(())
}

/// Place every completed artifact: flat always, overlay by ecosystem.
pub fn place_all(output: &Path, results: &[ArtifactResult]) -> miette::Result<()> {
    let mut yum_results = Vec::new();
    let mut apt_results = Vec::new();
    for result in results {
        if result.files.is_empty() {
            continue;
        }
        place_flat(output, result)?;
        match result.artifact.ecosystem {
            Ecosystem::Maven => place_maven(output, result)?,
            Ecosystem::Docker => place_docker(output, result)?,
            Ecosystem::Yum => yum_results.push(result),
            Ecosystem::Apt => apt_results.push(result),
            _ => {}
        }
    }
    if !yum_results.is_empty() {
        build_yum_repo(output, &yum_results)?;
    }
    if !apt_results.is_empty() {
        build_apt_repo(output, &apt_results)?;
    }
    Ok(())
}

fn split_evr(evr: &str) -> (String, String, String) {
    let (epoch, rest) = match evr.split_once(':') {
        Some((e, rest)) => (e.to_string(), rest),
        None => ("0".to_string(), evr),
    };
    match rest.split_once('-') {
        Some((version, release)) => (epoch, version.to_string(), release.to_string()),
        None => (epoch, rest.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_core::events::DownloadStatus;
    use airlift_core::{RepoDescriptor, ResolvedArtifact};
    use airlift_fetch::ArtifactResult;

    fn result(
        tmp: &Path,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
        file_name: &str,
        arch: Option<&str>,
    ) -> ArtifactResult {
        let path = tmp.join(file_name);
        std::fs::write(&path, b"artifact-bytes").unwrap();
        ArtifactResult {
            artifact: ResolvedArtifact {
                ecosystem,
                name: name.to_string(),
                version: version.to_string(),
                architecture: arch.map(str::to_string),
                url: format!("https://x/{file_name}"),
                file_name: file_name.to_string(),
                size: Some(14),
                checksum: None,
                auxiliary: Vec::new(),
                repository: RepoDescriptor::new("test", "https://x"),
                is_root: true,
                requested_by: None,
            },
            status: DownloadStatus::Completed,
            files: vec![airlift_fetch::FetchedFile {
                file_name: file_name.to_string(),
                path: path.clone(),
            }],
            error: None,
        }
    }

    #[test]
    fn flat_layout_is_always_present() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let r = result(
            cache.path(),
            Ecosystem::Pip,
            "requests",
            "2.31.0",
            "requests-2.31.0-py3-none-any.whl",
            None,
        );
        place_all(out.path(), &[r]).unwrap();
        assert!(out
            .path()
            .join("packages/requests-2.31.0-py3-none-any.whl")
            .is_file());
    }

    #[test]
    fn maven_overlay_uses_m2_layout() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let r = result(
            cache.path(),
            Ecosystem::Maven,
            "org.springframework:spring-core",
            "5.3.0",
            "spring-core-5.3.0.jar",
            None,
        );
        place_all(out.path(), &[r]).unwrap();
        assert!(out
            .path()
            .join("packages/m2repo/org/springframework/spring-core/5.3.0/spring-core-5.3.0.jar")
            .is_file());
    }

    #[test]
    fn yum_overlay_regenerates_repodata() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let r = result(
            cache.path(),
            Ecosystem::Yum,
            "bash",
            "5.2.15-1.el9",
            "bash-5.2.15-1.el9.x86_64.rpm",
            Some("x86_64"),
        );
        place_all(out.path(), &[r]).unwrap();
        let repo = out.path().join("packages/repo");
        assert!(repo.join("bash-5.2.15-1.el9.x86_64.rpm").is_file());
        let repomd = std::fs::read_to_string(repo.join("repodata/repomd.xml")).unwrap();
        assert!(repomd.contains("primary.xml.gz"));
        // the referenced primary file exists
        let href = repomd
            .split("href=\"")
            .nth(1)
            .unwrap()
            .split('"')
            .next()
            .unwrap();
        assert!(out.path().join("packages/repo").join(href).is_file());
    }

    #[test]
    fn apt_overlay_regenerates_packages_and_release() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let r = result(
            cache.path(),
            Ecosystem::Apt,
            "curl",
            "7.88.1-10",
            "curl_7.88.1-10_amd64.deb",
            Some("amd64"),
        );
        place_all(out.path(), &[r]).unwrap();
        let repo = out.path().join("packages/repo");
        assert!(repo.join("curl_7.88.1-10_amd64.deb").is_file());
        let packages = std::fs::read_to_string(repo.join("Packages")).unwrap();
        assert!(packages.contains("Package: curl"));
        assert!(packages.contains("Version: 7.88.1-10"));
        assert!(repo.join("Packages.gz").is_file());
        assert!(repo.join("Release").is_file());
    }

    #[test]
    fn docker_overlay_places_image_tar() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let r = result(
            cache.path(),
            Ecosystem::Docker,
            "nginx",
            "1.25",
            "nginx_1.25.tar",
            Some("arm64"),
        );
        place_all(out.path(), &[r]).unwrap();
        assert!(out.path().join("packages/images/nginx_1.25.tar").is_file());
    }
}
