//! Remote directory ensure: list the base path, create the subfolder if
//! it is not there.

use crate::ftps::transport::FtpsTransport;
use crate::ftps::types::{join_remote_path, FolderMatch, REPLY_PATHNAME_CREATED};

/// Whether a single listing line names `subfolder` under `base_path`.
pub fn listing_matches(line: &str, base_path: &str, subfolder: &str, policy: FolderMatch) -> bool {
    if line == subfolder {
        return true;
    }
    match policy {
        FolderMatch::Literal => false,
        FolderMatch::PathAware => {
            let wanted = subfolder.trim_matches('/');
            let line = line.trim_end_matches('/');
            line == join_remote_path(base_path, wanted)
                || line.rsplit('/').next() == Some(wanted)
        }
    }
}

/// Make sure `base_path/subfolder` exists.
///
/// Returns `true` when the folder was found in the base listing or the
/// server answered MKD with 257. Transport errors are logged and turn into
/// `false`; nothing is retried.
pub async fn ensure_folder(
    transport: &dyn FtpsTransport,
    base_path: &str,
    subfolder: &str,
    policy: FolderMatch,
) -> bool {
    let listing = match transport.list_directory(base_path).await {
        Ok(lines) => lines,
        Err(e) => {
            log::warn!("Listing {} failed: {}", base_path, e);
            return false;
        }
    };

    if listing
        .iter()
        .any(|line| listing_matches(line, base_path, subfolder, policy))
    {
        log::info!("Path [{}] found!", subfolder);
        return true;
    }

    let target = join_remote_path(base_path, subfolder);
    match transport.make_directory(&target).await {
        Ok(resp) if resp.code == REPLY_PATHNAME_CREATED => {
            log::info!("Path [{}] created!", subfolder);
            true
        }
        Ok(resp) => {
            log::warn!("Creating {} was refused: {}", target, resp.text());
            false
        }
        Err(e) => {
            log::warn!("Creating {} failed: {}", target, e);
            false
        }
    }
}
