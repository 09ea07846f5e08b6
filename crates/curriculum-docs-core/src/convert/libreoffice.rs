use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::traits::{Converter, ToolStatus};
use super::workspace::Workspace;
use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::util::{file_stem, sanitize_filename};

/// Name used for uploads whose filename sanitizes to nothing
const DEFAULT_INPUT_NAME: &str = "document.docx";

/// Captured output is cut to this many bytes per stream
const MAX_STREAM_CAPTURE: usize = 4096;

/// The two command lines tried, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    /// Explicit Writer PDF export filter with profile locking disabled
    WriterExport,
    /// Bare `pdf` target, for builds that reject the explicit filter or flags
    Permissive,
}

impl Invocation {
    const ALL: [Self; 2] = [Self::WriterExport, Self::Permissive];

    const fn label(self) -> &'static str {
        match self {
            Self::WriterExport => "writer_pdf_Export",
            Self::Permissive => "pdf",
        }
    }

    fn args(self, workspace: &Workspace, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--headless".into()];
        if self == Self::WriterExport {
            args.push("--norestore".into());
            args.push("--nolockcheck".into());
        }
        args.push(format!("-env:UserInstallation={}", workspace.profile_url()).into());
        args.push("--convert-to".into());
        args.push(match self {
            Self::WriterExport => "pdf:writer_pdf_Export".into(),
            Self::Permissive => "pdf".into(),
        });
        args.push("--outdir".into());
        args.push(workspace.output_dir().into_os_string());
        args.push(input.as_os_str().to_os_string());
        args
    }
}

/// Converter driving a headless LibreOffice (`soffice`) process
pub struct LibreOfficeConverter {
    config: ConverterConfig,
    /// Parent directory for workspaces; the system temp dir when `None`
    scratch_dir: Option<PathBuf>,
}

impl LibreOfficeConverter {
    pub const fn new(config: ConverterConfig) -> Self {
        Self {
            config,
            scratch_dir: None,
        }
    }

    /// Place conversion workspaces under `dir` instead of the system temp dir
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// First configured candidate that resolves to an executable
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        self.config
            .binaries
            .iter()
            .filter(|name| !name.trim().is_empty())
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                Error::ToolUnavailable(format!(
                    "none of [{}] found on PATH",
                    self.config.binaries.join(", ")
                ))
            })
    }

    fn workspace(&self, docx: &[u8]) -> Result<Workspace> {
        match &self.scratch_dir {
            Some(dir) => Workspace::create_in(dir, docx),
            None => Workspace::create(docx),
        }
    }

    async fn run(&self, binary: &Path, args: &[OsString]) -> Result<Output> {
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolUnavailable(format!("{}: {}", binary.display(), e))
                } else {
                    Error::Io(e)
                }
            })?;

        // Dropping the pending wait on timeout kills the child
        match tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(Error::ConversionTimeout {
                seconds: self.config.timeout_secs,
            }),
        }
    }

    async fn convert_in(
        &self,
        binary: &Path,
        workspace: &Workspace,
        docx: &[u8],
        filename: &str,
    ) -> Result<Vec<u8>> {
        let input_name = sanitize_filename(filename, DEFAULT_INPUT_NAME);
        let input = workspace.write_input(&input_name, docx).await?;
        let stem = file_stem(&input_name);
        let mut reasons = Vec::with_capacity(Invocation::ALL.len());
        let mut diagnostics = Vec::with_capacity(Invocation::ALL.len());

        for invocation in Invocation::ALL {
            if invocation != Invocation::WriterExport {
                workspace.reset_output().await?;
            }

            let args = invocation.args(workspace, &input);
            debug!("Running {} {:?}", binary.display(), args);
            let output = self.run(binary, &args).await?;

            if output.status.success() {
                if let Some(pdf) = workspace.find_pdf(stem).await? {
                    let bytes = tokio::fs::read(&pdf).await?;
                    info!(
                        "Converted {} ({} bytes) with {} via {}",
                        input_name,
                        bytes.len(),
                        binary.display(),
                        invocation.label()
                    );
                    return Ok(bytes);
                }
                reasons.push(format!("{} exited successfully but produced no PDF", invocation.label()));
            } else {
                reasons.push(format!("{} attempt failed with {}", invocation.label(), output.status));
            }

            if let Some(reason) = reasons.last() {
                warn!("Conversion of {}: {}", input_name, reason);
            }
            diagnostics.push(describe(invocation, &output));
        }

        Err(Error::ConversionFailed {
            reason: reasons.join("; "),
            diagnostics: diagnostics.join("\n"),
        })
    }
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    async fn convert(&self, docx: &[u8], filename: &str) -> Result<Vec<u8>> {
        let binary = self.resolve_binary()?;
        let workspace = self.workspace(docx)?;
        let result = self.convert_in(&binary, &workspace, docx, filename).await;
        workspace.close();
        result
    }

    async fn probe(&self) -> ToolStatus {
        let binary = match self.resolve_binary() {
            Ok(binary) => binary,
            Err(e) => return ToolStatus::unavailable(None, e.to_string()),
        };
        let shown = binary.display().to_string();

        let mut command = Command::new(&binary);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.config.probe_timeout(), command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                ToolStatus::available(shown, String::from_utf8_lossy(&output.stdout).trim())
            }
            Ok(Ok(output)) => ToolStatus::unavailable(
                Some(shown),
                format!(
                    "--version exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ),
            Ok(Err(e)) => ToolStatus::unavailable(Some(shown), e.to_string()),
            Err(_) => ToolStatus::unavailable(
                Some(shown),
                format!("--version timed out after {}s", self.config.probe_timeout_secs),
            ),
        }
    }
}

fn describe(invocation: Invocation, output: &Output) -> String {
    format!(
        "[{}] {}\nstdout: {}\nstderr: {}",
        invocation.label(),
        output.status,
        capture(&output.stdout),
        capture(&output.stderr)
    )
}

fn capture(stream: &[u8]) -> String {
    let text = String::from_utf8_lossy(stream);
    let text = text.trim();
    if text.len() <= MAX_STREAM_CAPTURE {
        return text.to_string();
    }
    let mut end = MAX_STREAM_CAPTURE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
