//! Tagged-variant argv composition over [`InstallerKind`].
//!
//! Each kind knows how to spell its own install/uninstall invocation; there
//! is no shared installer trait to implement because the three kinds share
//! no behaviour beyond "produce an argv".

use std::path::Path;

use apcore_catalog::{InstallerKind, PackageDescriptor};

use crate::RunError;

pub fn compose_install_argv(descriptor: &PackageDescriptor, path: &Path) -> Vec<String> {
    let path = path.to_string_lossy().into_owned();
    match descriptor.installer_kind {
        InstallerKind::Msi => {
            let mut argv = vec!["msiexec".to_string(), "/i".to_string(), path, "/qn".to_string()];
            argv.extend(descriptor.silent_args.iter().cloned());
            argv
        }
        InstallerKind::Exe => {
            let mut argv = vec![path];
            argv.extend(descriptor.silent_args.iter().cloned());
            argv
        }
        InstallerKind::Appx => vec![
            "powershell".to_string(),
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            format!("Add-AppxPackage -Path \"{path}\""),
        ],
    }
}

pub fn compose_uninstall_argv(
    descriptor: &PackageDescriptor,
    path: Option<&Path>,
) -> Result<Vec<String>, RunError> {
    match descriptor.installer_kind {
        InstallerKind::Msi => {
            let Some(path) = path else {
                return Err(RunError::UninstallUnsupported {
                    app_id: descriptor.app_id.clone(),
                });
            };
            Ok(vec![
                "msiexec".to_string(),
                "/x".to_string(),
                path.to_string_lossy().into_owned(),
                "/qn".to_string(),
            ])
        }
        InstallerKind::Exe => descriptor.uninstall_command.clone().ok_or_else(|| {
            RunError::UninstallUnsupported {
                app_id: descriptor.app_id.clone(),
            }
        }),
        InstallerKind::Appx => Ok(vec![
            "powershell".to_string(),
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            format!("Remove-AppxPackage -Package \"{}\"", descriptor.name),
        ]),
    }
}
