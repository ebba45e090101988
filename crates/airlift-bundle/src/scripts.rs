//! Offline install script generation: one POSIX shell script and one
//! PowerShell script, each covering only the ecosystems present in the
//! bundle, with a tool-availability guard per section.

use std::collections::BTreeSet;
use std::path::Path;

use airlift_core::Ecosystem;
use airlift_fetch::ArtifactResult;
use airlift_util::error::AirliftError;

/// Write `install.sh` and `install.ps1` into the bundle root.
pub fn write_scripts(output: &Path, results: &[ArtifactResult]) -> miette::Result<()> {
    let present: BTreeSet<Ecosystem> = results
        .iter()
        .filter(|r| !r.files.is_empty())
        .map(|r| r.artifact.ecosystem)
        .collect();

    let sh = render_sh(&present, results);
    airlift_util::fs::atomic_write(&output.join("install.sh"), sh.as_bytes())
        .map_err(AirliftError::Io)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(
            output.join("install.sh"),
            std::fs::Permissions::from_mode(0o755),
        );
    }

    let ps1 = render_ps1(&present, results);
    airlift_util::fs::atomic_write(&output.join("install.ps1"), ps1.as_bytes())
        .map_err(AirliftError::Io)?;
    Ok(())
}

fn docker_images(results: &[ArtifactResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.artifact.ecosystem == Ecosystem::Docker)
        .flat_map(|r| r.files.iter().map(|f| f.file_name.clone()))
        .collect()
}

fn pip_roots(results: &[ArtifactResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.artifact.ecosystem == Ecosystem::Pip && r.artifact.is_root)
        .map(|r| r.artifact.name.clone())
        .collect()
}

fn render_sh(present: &BTreeSet<Ecosystem>, results: &[ArtifactResult]) -> String {
    let mut out = String::from(
        "#!/bin/sh\n\
         # Offline installer generated by airlift. Run from the bundle root.\n\
         set -e\n\
         HERE=$(cd \"$(dirname \"$0\")\" && pwd)\n\n",
    );

    for eco in present {
        match eco {
            Ecosystem::Pip => {
                let roots = pip_roots(results).join(" ");
                out.push_str(&format!(
                    "if command -v pip >/dev/null 2>&1; then\n  pip install --no-index --find-links \"$HERE/packages\" {roots}\nelse\n  echo \"pip not found, skipping python packages\"\nfi\n\n"
                ));
            }
            Ecosystem::Conda => {
                out.push_str(
                    "if command -v conda >/dev/null 2>&1; then\n  conda install --offline -c \"$HERE/packages\" \"$HERE/packages\"/*.conda \"$HERE/packages\"/*.tar.bz2\nelse\n  echo \"conda not found, skipping conda packages\"\nfi\n\n",
                );
            }
            Ecosystem::Maven => {
                out.push_str(
                    "if command -v mvn >/dev/null 2>&1; then\n  echo \"maven artifacts staged in $HERE/packages/m2repo; build with mvn -Dmaven.repo.local=$HERE/packages/m2repo\"\nelse\n  echo \"mvn not found; maven artifacts remain in packages/m2repo\"\nfi\n\n",
                );
            }
            Ecosystem::Npm => {
                out.push_str(
                    "if command -v npm >/dev/null 2>&1; then\n  npm install --offline \"$HERE/packages\"/*.tgz\nelse\n  echo \"npm not found, skipping node packages\"\nfi\n\n",
                );
            }
            Ecosystem::Yum => {
                out.push_str(
                    "if command -v yum >/dev/null 2>&1; then\n  yum --disablerepo='*' localinstall -y \"$HERE/packages/repo\"/*.rpm\nelse\n  echo \"yum not found, skipping rpm packages\"\nfi\n\n",
                );
            }
            Ecosystem::Apt => {
                out.push_str(
                    "if command -v apt >/dev/null 2>&1; then\n  apt install -y \"$HERE/packages/repo\"/*.deb\nelse\n  echo \"apt not found, skipping deb packages\"\nfi\n\n",
                );
            }
            Ecosystem::Apk => {
                out.push_str(
                    "if command -v apk >/dev/null 2>&1; then\n  apk add --allow-untrusted \"$HERE/packages\"/*.apk\nelse\n  echo \"apk not found, skipping apk packages\"\nfi\n\n",
                );
            }
            Ecosystem::Docker => {
                out.push_str("if command -v docker >/dev/null 2>&1; then\n");
                for image in docker_images(results) {
                    out.push_str(&format!(
                        "  docker load -i \"$HERE/packages/images/{image}\"\n"
                    ));
                }
                out.push_str("else\n  echo \"docker not found, skipping images\"\nfi\n\n");
            }
        }
    }
    out
}

fn render_ps1(present: &BTreeSet<Ecosystem>, results: &[ArtifactResult]) -> String {
    let mut out = String::from(
        "# Offline installer generated by airlift. Run from the bundle root.\n\
         $ErrorActionPreference = \"Stop\"\n\
         $Here = Split-Path -Parent $MyInvocation.MyCommand.Path\n\n",
    );

    for eco in present {
        match eco {
            Ecosystem::Pip => {
                let roots = pip_roots(results).join(" ");
                out.push_str(&format!(
                    "if (Get-Command pip -ErrorAction SilentlyContinue) {{\n    pip install --no-index --find-links \"$Here\\packages\" {roots}\n}} else {{\n    Write-Host \"pip not found, skipping python packages\"\n}}\n\n"
                ));
            }
            Ecosystem::Conda => {
                out.push_str(
                    "if (Get-Command conda -ErrorAction SilentlyContinue) {\n    conda install --offline -c \"$Here\\packages\" (Get-ChildItem \"$Here\\packages\" -Include *.conda,*.tar.bz2 -Recurse)\n} else {\n    Write-Host \"conda not found, skipping conda packages\"\n}\n\n",
                );
            }
            Ecosystem::Npm => {
                out.push_str(
                    "if (Get-Command npm -ErrorAction SilentlyContinue) {\n    Get-ChildItem \"$Here\\packages\\*.tgz\" | ForEach-Object { npm install --offline $_.FullName }\n} else {\n    Write-Host \"npm not found, skipping node packages\"\n}\n\n",
                );
            }
            Ecosystem::Docker => {
                out.push_str("if (Get-Command docker -ErrorAction SilentlyContinue) {\n");
                for image in docker_images(results) {
                    out.push_str(&format!(
                        "    docker load -i \"$Here\\packages\\images\\{image}\"\n"
                    ));
                }
                out.push_str(
                    "} else {\n    Write-Host \"docker not found, skipping images\"\n}\n\n",
                );
            }
            Ecosystem::Maven => {
                out.push_str(
                    "Write-Host \"maven artifacts staged in $Here\\packages\\m2repo (use -Dmaven.repo.local)\"\n\n",
                );
            }
            // Linux-native package managers have no Windows path.
            Ecosystem::Yum | Ecosystem::Apt | Ecosystem::Apk => {
                out.push_str(&format!(
                    "Write-Host \"{eco} packages are Linux-only; install them from a Linux host\"\n\n"
                ));
            }
        }
    }
    out
}
