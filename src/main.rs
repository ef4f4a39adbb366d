use clap::{Arg, ArgAction, Command};
use std::env;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use ori_store::config::RepoConfig;
use ori_store::diff::FlatTree;
use ori_store::hash::ObjectHash;
use ori_store::logging::{self, info};
use ori_store::object::TreeEntry;
use ori_store::repo::Repository;
use ori_store::rpc::{RepoClient, RpcServer};

fn home_dir() -> PathBuf {
	PathBuf::from(env::var("HOME").expect("HOME must be set to locate the repository store"))
}

fn open_repo(dir: &str, writable: bool) -> Repository {
	let config = RepoConfig::load(&home_dir()).unwrap_or_default();
	Repository::open(dir, writable).expect("failed to open repository").with_config(config)
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs()
}

fn main() {
	logging::init_tracing();

	let matches = Command::new("ori")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("content-addressed object store with pull-based replication")
		.subcommand_required(true)
		.subcommand(Command::new("init").about("create a new repository").arg(Arg::new("dir").required(true)))
		.subcommand(
			Command::new("add-blob")
				.about("store a file's contents as a blob, chunking if large")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("file").required(true)),
		)
		.subcommand(
			Command::new("get-object")
				.about("print an object's raw payload to stdout")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("hash").required(true)),
		)
		.subcommand(
			Command::new("commit")
				.about("commit the current HEAD's tree with one file's blob replaced")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("path").required(true).help("tree path to add or replace"))
				.arg(Arg::new("file").required(true).help("local file whose contents become the blob"))
				.arg(Arg::new("message").short('m').long("message").default_value("")),
		)
		.subcommand(
			Command::new("update-head")
				.about("force HEAD to a given hash")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("hash").required(true)),
		)
		.subcommand(
			Command::new("pull")
				.about("pull missing objects and the head from a peer")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("peer").required(true).help("socket path, host:path, or bare path")),
		)
		.subcommand(Command::new("gc").about("compact packfiles, dropping unreferenced objects").arg(Arg::new("dir").required(true)))
		.subcommand(
			Command::new("serve")
				.about("run the replication RPC server")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("stdio").long("stdio").action(ArgAction::SetTrue).help("serve one session over stdin/stdout instead of a socket")),
		)
		.get_matches();

	let result = match matches.subcommand() {
		Some(("init", sub)) => cmd_init(sub.get_one::<String>("dir").unwrap()),
		Some(("add-blob", sub)) => cmd_add_blob(sub.get_one::<String>("dir").unwrap(), sub.get_one::<String>("file").unwrap()),
		Some(("get-object", sub)) => cmd_get_object(sub.get_one::<String>("dir").unwrap(), sub.get_one::<String>("hash").unwrap()),
		Some(("commit", sub)) => cmd_commit(
			sub.get_one::<String>("dir").unwrap(),
			sub.get_one::<String>("path").unwrap(),
			sub.get_one::<String>("file").unwrap(),
			sub.get_one::<String>("message").unwrap(),
		),
		Some(("update-head", sub)) => cmd_update_head(sub.get_one::<String>("dir").unwrap(), sub.get_one::<String>("hash").unwrap()),
		Some(("pull", sub)) => cmd_pull(sub.get_one::<String>("dir").unwrap(), sub.get_one::<String>("peer").unwrap()),
		Some(("gc", sub)) => cmd_gc(sub.get_one::<String>("dir").unwrap()),
		Some(("serve", sub)) => cmd_serve(sub.get_one::<String>("dir").unwrap(), sub.get_flag("stdio")),
		_ => unreachable!("subcommand_required"),
	};

	if let Err(e) = result {
		eprintln!("ori: {}", e);
		std::process::exit(1);
	}
}

fn cmd_init(dir: &str) -> Result<(), Box<dyn std::error::Error>> {
	let repo = Repository::open(dir, true)?;
	println!("initialized repository {} in {}", repo.fsid(), repo.dir().display());
	Ok(())
}

fn cmd_add_blob(dir: &str, file: &str) -> Result<(), Box<dyn std::error::Error>> {
	let mut repo = open_repo(dir, true);
	let contents = std::fs::read(file)?;
	let hash = repo.add_file(&contents)?;
	println!("{}", hash);
	Ok(())
}

fn cmd_get_object(dir: &str, hash: &str) -> Result<(), Box<dyn std::error::Error>> {
	use std::io::Write;
	let mut repo = open_repo(dir, false);
	let hash = ObjectHash::from_hex(hash)?;
	let object = repo.get_object(&hash)?;
	std::io::stdout().write_all(&object.payload)?;
	Ok(())
}

fn cmd_commit(dir: &str, path: &str, file: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
	let mut repo = open_repo(dir, true);
	let contents = std::fs::read(file)?;
	let blob = repo.add_file(&contents)?;

	let mut flat: FlatTree = match repo.get_head()? {
		Some(head) => {
			let commit = repo.get_commit(head)?;
			repo.flatten_tree(commit.tree)?
		}
		None => FlatTree::new(),
	};
	flat.insert(path.to_string(), TreeEntry::new_blob(blob, Default::default()));
	let tree = repo.unflatten_tree(&flat)?;

	let user = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
	let commit_hash = repo.commit_from_tree(tree, &user, now_secs(), None, message)?;
	println!("{}", commit_hash);
	Ok(())
}

fn cmd_update_head(dir: &str, hash: &str) -> Result<(), Box<dyn std::error::Error>> {
	let mut repo = open_repo(dir, true);
	repo.update_head(ObjectHash::from_hex(hash)?)?;
	Ok(())
}

fn cmd_pull(dir: &str, peer: &str) -> Result<(), Box<dyn std::error::Error>> {
	let mut repo = open_repo(dir, true);
	let mut remote = connect_peer(peer)?;
	repo.pull(&mut remote)?;
	info!(peer = peer, "pull complete");
	Ok(())
}

fn cmd_gc(dir: &str) -> Result<(), Box<dyn std::error::Error>> {
	let mut repo = open_repo(dir, true);
	repo.gc()?;
	Ok(())
}

fn cmd_serve(dir: &str, stdio: bool) -> Result<(), Box<dyn std::error::Error>> {
	if stdio {
		ori_store::rpc::server::serve_stdio(std::path::Path::new(dir))?;
		return Ok(());
	}

	let config = RepoConfig::load(&home_dir()).unwrap_or_default();
	let repo = Repository::open(dir, true)?.with_config(config.clone());
	let socket_path = repo.dir().join(&config.rpc_socket_name);
	let repo = std::sync::Arc::new(std::sync::Mutex::new(repo));
	let server = RpcServer::bind(repo, socket_path)?;

	// The accept loop itself is synchronous (spec §5's thread-per-session
	// model); a small tokio runtime runs alongside it purely to drive the
	// SIGTERM/SIGINT lock-cleanup handler.
	let runtime = tokio::runtime::Runtime::new()?;
	let _guard = runtime.enter();
	ori_store::lock::setup_signal_handlers();

	server.serve_forever()?;
	Ok(())
}

/// Connect to a peer. A path ending in the socket name is dialed
/// directly over a Unix socket; anything else (a bare repo path, or
/// `host:path`) is reached by spawning `ori-serve --stdio`, locally or
/// over ssh, per [`ori_store::rpc::transport::PeerLocation`].
fn connect_peer(peer: &str) -> Result<RepoClient<Box<dyn ReadWrite>>, Box<dyn std::error::Error>> {
	use ori_store::rpc::transport::{ChildDuplex, PeerLocation};

	let location = PeerLocation::detect(peer);
	let inner: Box<dyn ReadWrite> = match &location {
		PeerLocation::Local { path } if path.ends_with(".sock") => {
			Box::new(std::os::unix::net::UnixStream::connect(path)?)
		}
		_ => Box::new(ChildDuplex::spawn(&location)?),
	};
	Ok(RepoClient::handshake(inner)?)
}

trait ReadWrite: std::io::Read + std::io::Write {}
impl<T: std::io::Read + std::io::Write> ReadWrite for T {}

// vim: ts=4
