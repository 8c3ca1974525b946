//! Binary package integration.
//!
//! Packages are fetched by an external tool fed a line-oriented ensure-file.
//! This module expands `${platform}` / `${os}` / `${arch}` name templates,
//! generates ensure-files that enumerate every supported platform (via the
//! `${var=a,b,c}` constraint syntax, which sidesteps the tool's requirement
//! that the header list every platform), and parses the resolved instance
//! ids back out of the tool's JSON output.

use std::fmt;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::lockfile::{Lockfile, PackageLock};
use crate::manifest::Package;
use crate::workspace::Workspace;

/// Default bound on one package-tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// A target platform in `os-arch` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((os, arch)) = raw.split_once('-') else {
            return Err(Error::Config(format!(
                "malformed platform {raw:?}; expected os-arch"
            )));
        };
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    /// The platform this process runs on, in the package tool's naming.
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "mac",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Platforms a package is resolved for when it does not constrain itself.
pub fn default_platforms() -> Vec<Platform> {
    ["linux-amd64", "linux-arm64", "mac-amd64", "mac-arm64"]
        .iter()
        .map(|p| Platform::parse(p).expect("static platform"))
        .collect()
}

/// The platforms one package applies to: its `platforms` attribute, or the
/// defaults.
pub fn package_platforms(package: &Package) -> Result<Vec<Platform>> {
    if package.platforms.is_empty() {
        return Ok(default_platforms());
    }
    package
        .platforms
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Platform::parse)
        .collect()
}

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([a-z]+)(?:=([^}]*))?\}").expect("static regex"))
}

/// Expand a name template for one platform. `Ok(None)` means the platform
/// fails a `${var=...}` constraint and the package is not applicable there.
pub fn expand_name(template: &str, platform: &Platform) -> Result<Option<String>> {
    let mut out = String::new();
    let mut last = 0;
    for caps in template_re().captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let var = &caps[1];
        let value = match var {
            "platform" => platform.to_string(),
            "os" => platform.os.clone(),
            "arch" => platform.arch.clone(),
            other => {
                return Err(Error::Config(format!(
                    "unknown template variable ${{{other}}} in package name {template:?}"
                )));
            }
        };
        if let Some(allowed) = caps.get(2) {
            let ok = allowed
                .as_str()
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == value);
            if !ok {
                return Ok(None);
            }
        }
        out.push_str(&value);
    }
    out.push_str(&template[last..]);
    Ok(Some(out))
}

/// Rewrite a name template so every variable carries an explicit constraint
/// enumerating the package's platforms. This is what lets one ensure-file
/// cover packages with different platform sets.
fn constrained_name(package: &Package) -> Result<String> {
    let platforms = package_platforms(package)?;
    let mut out = String::new();
    let mut last = 0;
    for caps in template_re().captures_iter(&package.name) {
        let whole = caps.get(0).expect("capture 0 always present");
        out.push_str(&package.name[last..whole.start()]);
        last = whole.end();
        if caps.get(2).is_some() {
            // Already constrained; keep the author's list.
            out.push_str(whole.as_str());
            continue;
        }
        let var = &caps[1];
        let values: Vec<String> = match var {
            "platform" => platforms.iter().map(Platform::to_string).collect(),
            "os" => dedup(platforms.iter().map(|p| p.os.clone())),
            "arch" => dedup(platforms.iter().map(|p| p.arch.clone())),
            other => {
                return Err(Error::Config(format!(
                    "unknown template variable ${{{other}}} in package name {:?}",
                    package.name
                )));
            }
        };
        out.push_str(&format!("${{{var}={}}}", values.join(",")));
    }
    out.push_str(&package.name[last..]);
    Ok(out)
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Generate the resolve ensure-file: a `$Platforms` header naming the union
/// of all packages' platforms, then one `name version` line per package.
pub fn ensure_file(packages: &[Package]) -> Result<String> {
    let mut all: Vec<Platform> = Vec::new();
    for package in packages {
        for platform in package_platforms(package)? {
            if !all.contains(&platform) {
                all.push(platform);
            }
        }
    }
    all.sort();

    let mut out = String::new();
    out.push_str("$Platforms");
    for platform in &all {
        out.push(' ');
        out.push_str(&platform.to_string());
    }
    out.push('\n');
    for package in packages {
        out.push_str(&constrained_name(package)?);
        out.push(' ');
        out.push_str(&package.version);
        out.push('\n');
    }
    Ok(out)
}

/// Ensure-file for materializing packages on the host platform only.
pub fn host_ensure_file(packages: &[Package]) -> Result<String> {
    let host = Platform::host();
    let mut out = String::new();
    out.push_str(&format!("$Platforms {host}\n"));
    for package in packages {
        if !package_platforms(package)?.contains(&host) {
            continue;
        }
        match expand_name(&package.name, &host)? {
            Some(name) => {
                out.push_str(&name);
                out.push(' ');
                out.push_str(&package.version);
                out.push('\n');
            }
            None => log::debug!("package {} not applicable on {host}", package.name),
        }
    }
    Ok(out)
}

/// Locks from an existing lockfile that still cover `package` (same version
/// tag, every applicable platform present). Empty means a re-resolve is due.
pub fn reusable_locks(package: &Package, existing: &Lockfile) -> Vec<PackageLock> {
    let Ok(platforms) = package_platforms(package) else {
        return Vec::new();
    };
    let mut locks = Vec::new();
    for platform in platforms {
        let Ok(Some(name)) = expand_name(&package.name, &platform) else {
            continue;
        };
        match existing.package_instance(&name, &package.version) {
            Some(id) => locks.push(PackageLock {
                package: name,
                version: package.version.clone(),
                instance_id: id.to_string(),
            }),
            None => return Vec::new(),
        }
    }
    locks
}

#[derive(Debug, Deserialize)]
struct ResolveOutput {
    result: Vec<PackageLock>,
}

/// Invoke the external package tool to resolve instance ids for `packages`.
pub fn resolve_packages(ws: &Workspace, packages: &[Package]) -> Result<Vec<PackageLock>> {
    if packages.is_empty() {
        return Ok(Vec::new());
    }
    let tool = locate_tool(ws)?;
    let ensure = ensure_file(packages)?;

    let dir = tempfile::tempdir()?;
    let ensure_path = dir.path().join("resolve.ensure");
    std::fs::write(&ensure_path, &ensure)?;
    let output_path = dir.path().join("resolve.json");

    run_tool(
        ws,
        Command::new(&tool)
            .arg("resolve")
            .arg(&ensure_path)
            .arg("-json-output")
            .arg(&output_path),
        DEFAULT_TIMEOUT,
    )?;

    let content = std::fs::read_to_string(&output_path).map_err(|e| {
        Error::EnsureFile(format!("package tool produced no resolve output: {e}"))
    })?;
    let parsed: ResolveOutput = serde_json::from_str(&content)
        .map_err(|e| Error::EnsureFile(format!("malformed resolve output: {e}")))?;
    Ok(parsed.result)
}

/// Materialize packages for the host platform under the workspace root.
pub fn fetch_packages(
    ws: &Workspace,
    packages: &[Package],
    timeout: Duration,
) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }
    let tool = locate_tool(ws)?;
    let ensure = host_ensure_file(packages)?;

    let dir = tempfile::tempdir()?;
    let ensure_path = dir.path().join("fetch.ensure");
    std::fs::write(&ensure_path, &ensure)?;

    run_tool(
        ws,
        Command::new(&tool)
            .arg("ensure")
            .arg("-root")
            .arg(ws.root())
            .arg("-ensure-file")
            .arg(&ensure_path),
        timeout,
    )?;

    // Flag files record which packages were materialized, for build systems
    // that key off their presence.
    for package in packages {
        if package.flag.is_empty() {
            continue;
        }
        let flag = ws.root().join(&package.flag);
        crate::fsops::safe_write(&flag, format!("{}\n", package.version).as_bytes())?;
    }
    Ok(())
}

fn locate_tool(ws: &Workspace) -> Result<std::path::PathBuf> {
    let name = &ws.config().package_tool;
    which::which(name).map_err(|_| Error::ToolMissing(name.clone()))
}

/// Run the tool with the workspace PATH and a hard deadline; a deadline hit
/// kills the child and reports a transient failure.
fn run_tool(ws: &Workspace, command: &mut Command, timeout: Duration) -> Result<()> {
    command
        .env("PATH", ws.child_path_env())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!("$ {command:?}");
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolMissing(format!("{command:?}"))
        } else {
            Error::Io(e)
        }
    })?;
    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(()),
        Some(status) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use std::io::Read;
                let _ = pipe.read_to_string(&mut stderr);
            }
            Err(Error::EnsureFile(format!(
                "package tool exited with {status}: {}",
                stderr.trim()
            )))
        }
        None => {
            child.kill()?;
            let _ = child.wait();
            Err(Error::Transient(format!(
                "package tool exceeded its {}s deadline",
                timeout.as_secs()
            )))
        }
    }
}
