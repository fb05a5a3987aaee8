//! Shell scripts dispatched to the remote hosts.
//!
//! Every function here is pure: the same inputs always produce the same
//! script, and every script is safe to run more than once.

use super::{Artifact, ArtifactKind, Backend};
use crate::cli::ClusterConfig;
use crate::topology::{NodeDescriptor, Topology};

/// Fetch the backend executable on `host` unless it is already present.
///
/// Also creates the bin dir and every data dir the topology places on the
/// host, and fails early when `lsof` is missing since stopping relies on it.
pub fn fetch_script(
    backend: &dyn Backend,
    artifact: &Artifact,
    topology: &Topology,
    config: &ClusterConfig,
    host: &str,
) -> String {
    let bin_dir = config.bin_dir.trim_end_matches('/');
    let cmd = config.binary_path(backend.binary_name());

    let mut dirs = vec![quote(bin_dir)];
    dirs.extend(topology.data_dirs_on(host).into_iter().map(quote));

    let download = match artifact.kind {
        ArtifactKind::Binary => format!(
            "    curl -fsSL -o \"$cmd\" {url}\n",
            url = quote(&artifact.url)
        ),
        ArtifactKind::Tarball => format!(
            "    archive=\"$bin_dir/{name}.tar.gz\"\n\
             \x20   curl -fsSL -o \"$archive\" {url}\n\
             \x20   tar -xzf \"$archive\" -C \"$bin_dir\"\n\
             \x20   rm -f \"$archive\"\n",
            name = backend.binary_name(),
            url = quote(&artifact.url)
        ),
    };

    format!(
        "set -e\n\
         if ! command -v lsof >/dev/null 2>&1; then\n\
         \x20   echo \"lsof command could not be found\" >&2\n\
         \x20   exit 1\n\
         fi\n\
         bin_dir={bin_dir}\n\
         cmd={cmd}\n\
         mkdir -p {dirs}\n\
         if [ -x \"$cmd\" ]; then\n\
         \x20   echo \"{name} is present and executable, no need to download\"\n\
         else\n\
         {download}\
         \x20   chmod +x \"$cmd\"\n\
         fi\n",
        bin_dir = quote(bin_dir),
        cmd = quote(&cmd),
        dirs = dirs.join(" "),
        name = backend.binary_name(),
        download = download,
    )
}

/// Launch one instance detached from the remote session
pub fn start_script(
    backend: &dyn Backend,
    node: &NodeDescriptor,
    topology: &Topology,
    config: &ClusterConfig,
) -> String {
    let command = backend.start_command(node, topology, config);
    let log_file = format!(
        "{}/{}-{}-{}.log",
        config.bin_dir.trim_end_matches('/'),
        backend.binary_name(),
        node.role,
        node.port
    );
    format!(
        "mkdir -p {dir}\nnohup setsid {command} >> {log} 2>&1 < /dev/null &\n",
        dir = quote(&node.data_dir),
        command = command,
        log = quote(&log_file),
    )
}

/// Terminate whatever process owns the node's port
pub fn stop_script(node: &NodeDescriptor) -> String {
    format!(
        "pids=$(lsof -t -i:{port} -sTCP:LISTEN 2>/dev/null || true)\n\
         if [ -n \"$pids\" ]; then\n\
         \x20   kill -15 $pids\n\
         fi\n",
        port = node.port
    )
}

/// Single-quote a value for POSIX sh
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:=,@+_".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
