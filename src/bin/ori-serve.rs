//! Thin entry point spawned by a peer's [`ori_store::rpc::transport::ChildDuplex::spawn`]
//! (directly, or via `ssh <host> ori-serve --stdio <path>`): runs exactly
//! one RPC session over its own stdin/stdout, then exits.

use clap::{Arg, Command};
use std::path::PathBuf;

use ori_store::logging;

fn main() {
	logging::init_tracing_for_remote_transport();

	let matches = Command::new("ori-serve")
		.about("run one replication RPC session over stdin/stdout")
		.arg(Arg::new("stdio").long("stdio").required(true).num_args(0))
		.arg(Arg::new("dir").required(true))
		.get_matches();

	let dir = PathBuf::from(matches.get_one::<String>("dir").unwrap());
	if let Err(e) = ori_store::rpc::server::serve_stdio(&dir) {
		eprintln!("ori-serve: {}", e);
		std::process::exit(1);
	}
}
