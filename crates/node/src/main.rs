mod query;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use qitd_chainstate::{hash_hex, BlockTree, ChainStateOptions, CoinStore};
use qitd_consensus::{consensus_params, Network};
use qitd_log::{self as logging, log_info, log_warn};
use qitd_storage::fjall::{FjallOptions, FjallStore};
use qitd_storage::memory::MemoryStore;
use qitd_storage::{
    meta, Column, KeyValueStore, PrefixVisitor, RangeVisitor, ScanResult, StoreError, WriteBatch,
};

use crate::query::{parse_account_hex, parse_hash_hex, run_identity_query, run_store_query, Query};

const DEFAULT_DATA_DIR: &str = "data";
const CONF_FILE_NAME: &str = "qitd.conf";
const DB_DIR_NAME: &str = "db";
const DATA_DIR_LOCK_FILE_NAME: &str = ".lock";
const MB: u64 = 1024 * 1024;
const DEFAULT_DB_CACHE_MB: u64 = 256;
const DEFAULT_DB_WRITE_BUFFER_MB: u64 = 2048;
const DEFAULT_DB_JOURNAL_MB: u64 = 2048;
const DEFAULT_DB_MEMTABLE_BYTES: u32 = 64 << 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Backend {
    Memory,
    Fjall,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "memory" => Some(Self::Memory),
            "fjall" => Some(Self::Fjall),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Config {
    backend: Backend,
    data_dir: PathBuf,
    conf_path: PathBuf,
    network: Network,
    db_batch_size: usize,
    db_cache_bytes: u64,
    db_write_buffer_bytes: u64,
    db_journal_bytes: u64,
    db_memtable_bytes: u32,
    db_fsync_ms: Option<u16>,
    log_level: logging::Level,
    log_format: logging::Format,
    log_timestamps: bool,
    upgrade_index: bool,
    query: Option<Query>,
    unsupported_conf_keys: Vec<String>,
}

#[derive(Debug)]
enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

pub(crate) enum Store {
    Memory(MemoryStore),
    Fjall(FjallStore),
}

impl KeyValueStore for Store {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Store::Memory(store) => store.get(column, key),
            Store::Fjall(store) => store.get(column, key),
        }
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.put(column, key, value),
            Store::Fjall(store) => store.put(column, key, value),
        }
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.delete(column, key),
            Store::Fjall(store) => store.delete(column, key),
        }
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        match self {
            Store::Memory(store) => store.scan_prefix(column, prefix),
            Store::Fjall(store) => store.scan_prefix(column, prefix),
        }
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.for_each_prefix(column, prefix, visitor),
            Store::Fjall(store) => store.for_each_prefix(column, prefix, visitor),
        }
    }

    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.for_each_from(column, start, visitor),
            Store::Fjall(store) => store.for_each_from(column, start, visitor),
        }
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.write_batch(batch),
            Store::Fjall(store) => store.write_batch(batch),
        }
    }
}

struct DataDirLock {
    _file: File,
}

fn lock_data_dir(data_dir: &Path) -> Result<DataDirLock, String> {
    let lock_path = data_dir.join(DATA_DIR_LOCK_FILE_NAME);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| format!("failed to open lock file {}: {err}", lock_path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();
            Ok(DataDirLock { _file: file })
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            let mut holder = String::new();
            let _ =
                File::open(&lock_path).and_then(|mut reader| reader.read_to_string(&mut holder));
            Err(format!(
                "data dir {} is already locked by another qitd process ({})",
                data_dir.display(),
                holder.trim()
            ))
        }
        Err(err) => Err(format!(
            "failed to lock data dir {} (lock file {}): {err}",
            data_dir.display(),
            lock_path.display()
        )),
    }
}

fn open_store(config: &Config) -> Result<Store, String> {
    match config.backend {
        Backend::Memory => Ok(Store::Memory(MemoryStore::new())),
        Backend::Fjall => {
            let db_path = config.data_dir.join(DB_DIR_NAME);
            let options = FjallOptions {
                cache_bytes: Some(config.db_cache_bytes),
                write_buffer_bytes: Some(config.db_write_buffer_bytes),
                journal_bytes: Some(config.db_journal_bytes),
                memtable_bytes: Some(config.db_memtable_bytes),
                fsync_ms: config.db_fsync_ms,
            };
            let partition_count = Column::ALL.len() as u64;
            let max_memtables = u64::from(config.db_memtable_bytes).saturating_mul(partition_count);
            if config.db_write_buffer_bytes < max_memtables {
                log_warn!(
                    "--db-write-buffer-mb ({}) is below partitions ({}) x --db-memtable-mb ({}); expect frequent flushes",
                    config.db_write_buffer_bytes / MB,
                    partition_count,
                    u64::from(config.db_memtable_bytes) / MB,
                );
            }
            if config.db_journal_bytes < max_memtables.saturating_mul(2) {
                log_warn!(
                    "--db-journal-mb ({}) is below 2 x partitions ({}) x --db-memtable-mb ({}); writes may stall when journals fill",
                    config.db_journal_bytes / MB,
                    partition_count,
                    u64::from(config.db_memtable_bytes) / MB,
                );
            }
            let store = FjallStore::open_with_options(&db_path, options)
                .map_err(|err| format!("failed to open {}: {err}", db_path.display()))?;
            Ok(Store::Fjall(store))
        }
    }
}

pub fn run_entry() -> Result<(), String> {
    match parse_args()? {
        CliAction::PrintHelp => {
            println!("{}", usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("qitd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(config) => run(config),
    }
}

fn run(config: Config) -> Result<(), String> {
    logging::init(logging::LogConfig {
        level: config.log_level,
        format: config.log_format,
        timestamps: config.log_timestamps,
    });
    for key in &config.unsupported_conf_keys {
        log_warn!("ignoring unsupported key '{key}' in {}", config.conf_path.display());
    }

    let params = consensus_params(config.network);
    params
        .validate()
        .map_err(|err| format!("invalid consensus parameters: {err}"))?;

    if let Some(query) = config.query.as_ref().filter(|query| !query.needs_store()) {
        return print_json(&run_identity_query(query)?);
    }

    log_info!(
        "Startup: backend={:?}, network={}, data_dir={}",
        config.backend,
        config.network.as_str(),
        config.data_dir.display()
    );
    let _lock = match config.backend {
        Backend::Fjall => {
            fs::create_dir_all(&config.data_dir).map_err(|err| {
                format!("failed to create data dir {}: {err}", config.data_dir.display())
            })?;
            Some(lock_data_dir(&config.data_dir)?)
        }
        Backend::Memory => None,
    };

    let store = Arc::new(open_store(&config)?);
    let coins = CoinStore::new(
        Arc::clone(&store),
        params,
        ChainStateOptions {
            batch_size: config.db_batch_size,
        },
    )
    .map_err(|err| err.to_string())?;

    prepare_coin_db(&coins, config.upgrade_index)?;
    report_chain_state(&coins, &BlockTree::new(Arc::clone(&store)))?;

    if let Some(query) = &config.query {
        print_json(&run_store_query(&coins, query)?)?;
    }
    Ok(())
}

/// Brings the account indexes up to the current layout. `force` discards
/// the stored version first so every index is rebuilt.
fn prepare_coin_db<S: KeyValueStore>(coins: &CoinStore<S>, force: bool) -> Result<(), String> {
    if force {
        coins
            .store()
            .delete(Column::Meta, meta::INDEX_VERSION)
            .map_err(|err| err.to_string())?;
    }
    let rebuilt = coins
        .upgrade_indexes(|_| {})
        .map_err(|err| format!("index upgrade failed: {err}"))?;
    if rebuilt {
        log_info!("Rebuilt account indexes");
    }
    Ok(())
}

fn report_chain_state<S: KeyValueStore>(
    coins: &CoinStore<S>,
    block_tree: &BlockTree<S>,
) -> Result<(), String> {
    if let Some((new_tip, old_tip)) = coins.head_blocks().map_err(|err| err.to_string())? {
        log_warn!(
            "coin database holds an unfinished transition {} -> {}; it must be replayed",
            hash_hex(&old_tip),
            hash_hex(&new_tip)
        );
    }
    match coins.best_block().map_err(|err| err.to_string())? {
        Some(best) => log_info!("Coin database best block {}", hash_hex(&best)),
        None => log_info!("Coin database is empty"),
    }
    if block_tree.is_reindexing().map_err(|err| err.to_string())? {
        log_warn!("block index is marked as reindexing");
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn parse_args() -> Result<CliAction, String> {
    parse_args_from(std::env::args().skip(1))
}

fn parse_args_from<I>(raw_args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut backend = Backend::Fjall;
    let mut backend_set = false;
    let mut data_dir: Option<PathBuf> = None;
    let mut conf_path: Option<PathBuf> = None;
    let mut network = Network::Mainnet;
    let mut network_set = false;
    let mut db_batch_size = qitd_chainstate::store::DEFAULT_BATCH_SIZE;
    let mut db_batch_size_set = false;
    let mut db_cache_mb = DEFAULT_DB_CACHE_MB;
    let mut db_cache_set = false;
    let mut db_write_buffer_mb = DEFAULT_DB_WRITE_BUFFER_MB;
    let mut db_write_buffer_set = false;
    let mut db_journal_mb = DEFAULT_DB_JOURNAL_MB;
    let mut db_journal_set = false;
    let mut db_memtable_bytes = DEFAULT_DB_MEMTABLE_BYTES;
    let mut db_memtable_set = false;
    let mut db_fsync_ms: Option<u16> = None;
    let mut db_fsync_ms_set = false;
    let mut log_level = logging::Level::Info;
    let mut log_level_set = false;
    let mut log_format = logging::Format::Text;
    let mut log_format_set = false;
    let mut log_timestamps = true;
    let mut log_timestamps_set = false;
    let mut upgrade_index = false;
    let mut query: Option<Query> = None;
    let mut args = raw_args.into_iter();

    while let Some(arg) = args.next() {
        let mut value_for = |flag: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))
        };
        match arg.as_str() {
            "help" | "--help" | "-h" => return Ok(CliAction::PrintHelp),
            "version" | "--version" => return Ok(CliAction::PrintVersion),
            "--backend" => {
                let value = value_for("--backend")?;
                backend = Backend::parse(&value).ok_or_else(|| {
                    format!("invalid backend '{value}' (expected memory|fjall)\n{}", usage())
                })?;
                backend_set = true;
            }
            "--data-dir" => data_dir = Some(PathBuf::from(value_for("--data-dir")?)),
            "--conf" => conf_path = Some(PathBuf::from(value_for("--conf")?)),
            "--network" => {
                let value = value_for("--network")?;
                network = Network::parse(&value)
                    .ok_or_else(|| format!("invalid network '{value}'\n{}", usage()))?;
                network_set = true;
            }
            "--db-batch-size" => {
                let value = value_for("--db-batch-size")?;
                db_batch_size = parse_batch_size(&value)
                    .ok_or_else(|| format!("invalid --db-batch-size '{value}'"))?;
                db_batch_size_set = true;
            }
            "--db-cache-mb" => {
                let value = value_for("--db-cache-mb")?;
                db_cache_mb = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --db-cache-mb '{value}'"))?;
                db_cache_set = true;
            }
            "--db-write-buffer-mb" => {
                let value = value_for("--db-write-buffer-mb")?;
                db_write_buffer_mb = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --db-write-buffer-mb '{value}'"))?;
                db_write_buffer_set = true;
            }
            "--db-journal-mb" => {
                let value = value_for("--db-journal-mb")?;
                db_journal_mb = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --db-journal-mb '{value}'"))?;
                db_journal_set = true;
            }
            "--db-memtable-mb" => {
                let value = value_for("--db-memtable-mb")?;
                db_memtable_bytes = parse_memtable_mb(&value)
                    .ok_or_else(|| format!("invalid --db-memtable-mb '{value}'"))?;
                db_memtable_set = true;
            }
            "--db-fsync-ms" => {
                let value = value_for("--db-fsync-ms")?;
                db_fsync_ms = parse_fsync_ms(&value)
                    .ok_or_else(|| format!("invalid --db-fsync-ms '{value}'"))?;
                db_fsync_ms_set = true;
            }
            "--log-level" => {
                let value = value_for("--log-level")?;
                log_level = logging::Level::parse(&value)
                    .ok_or_else(|| format!("invalid log level '{value}'\n{}", usage()))?;
                log_level_set = true;
            }
            "--log-format" => {
                let value = value_for("--log-format")?;
                log_format = logging::Format::parse(&value)
                    .ok_or_else(|| format!("invalid log format '{value}'\n{}", usage()))?;
                log_format_set = true;
            }
            "--log-timestamps" => {
                log_timestamps = true;
                log_timestamps_set = true;
            }
            "--no-log-timestamps" => {
                log_timestamps = false;
                log_timestamps_set = true;
            }
            "--upgrade-index" => upgrade_index = true,
            "--balance" => {
                let value = value_for("--balance")?;
                let account = parse_account_hex(&value)
                    .ok_or_else(|| format!("invalid account id '{value}' (expected 40 hex chars)"))?;
                set_query(&mut query, Query::Balance(account))?;
            }
            "--bindings-for-account" => {
                let value = value_for("--bindings-for-account")?;
                let account = parse_account_hex(&value)
                    .ok_or_else(|| format!("invalid account id '{value}' (expected 40 hex chars)"))?;
                set_query(
                    &mut query,
                    Query::BindingsForAccount {
                        account,
                        plotter_id: 0,
                    },
                )?;
            }
            "--bindings-for-plotter" => {
                let value = value_for("--bindings-for-plotter")?;
                let plotter_id = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid plotter id '{value}'"))?;
                set_query(&mut query, Query::BindingsForPlotter(plotter_id))?;
            }
            "--top-staking" => {
                let value = value_for("--top-staking")?;
                let limit = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid --top-staking count '{value}'"))?;
                set_query(&mut query, Query::TopStaking(limit))?;
            }
            "--staking-pools" => {
                let value = value_for("--staking-pools")?;
                let epoch = parse_hash_hex(&value)
                    .ok_or_else(|| format!("invalid epoch hash '{value}' (expected 64 hex chars)"))?;
                set_query(&mut query, Query::StakingPools(epoch))?;
            }
            "--plotter-id" => {
                let passphrase = value_for("--plotter-id")?;
                set_query(&mut query, Query::PlotterId(passphrase))?;
            }
            "--farmer-id" => {
                let passphrase = value_for("--farmer-id")?;
                set_query(&mut query, Query::FarmerId(passphrase))?;
            }
            other => return Err(format!("unknown argument '{other}'\n{}", usage())),
        }
    }

    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let conf_file = conf_path.unwrap_or_else(|| data_dir.join(CONF_FILE_NAME));
    let mut unsupported_conf_keys = Vec::new();
    if let Some(conf) = load_qitd_conf(&conf_file)? {
        let last = |key: &str| conf.get(key).and_then(|values| values.last());
        let invalid = |key: &str, raw: &str| {
            format!("invalid {key} '{raw}' in {}", conf_file.display())
        };

        if !network_set {
            if let Some(raw) = last("network") {
                network = Network::parse(raw).ok_or_else(|| invalid("network", raw))?;
            }
            for (key, candidate) in [("testnet", Network::Testnet), ("regtest", Network::Regtest)] {
                if let Some(raw) = last(key) {
                    if parse_conf_bool(raw).ok_or_else(|| invalid(key, raw))? {
                        network = candidate;
                    }
                }
            }
        }
        if !backend_set {
            if let Some(raw) = last("backend") {
                backend = Backend::parse(raw).ok_or_else(|| invalid("backend", raw))?;
            }
        }
        if !db_batch_size_set {
            if let Some(raw) = last("dbbatchsize") {
                db_batch_size = parse_batch_size(raw).ok_or_else(|| invalid("dbbatchsize", raw))?;
            }
        }
        if !db_cache_set {
            if let Some(raw) = last("dbcache") {
                db_cache_mb = raw.parse::<u64>().map_err(|_| invalid("dbcache", raw))?;
            }
        }
        if !db_write_buffer_set {
            if let Some(raw) = last("dbwritebuffer") {
                db_write_buffer_mb = raw.parse::<u64>().map_err(|_| invalid("dbwritebuffer", raw))?;
            }
        }
        if !db_journal_set {
            if let Some(raw) = last("dbjournal") {
                db_journal_mb = raw.parse::<u64>().map_err(|_| invalid("dbjournal", raw))?;
            }
        }
        if !db_memtable_set {
            if let Some(raw) = last("dbmemtable") {
                db_memtable_bytes = parse_memtable_mb(raw).ok_or_else(|| invalid("dbmemtable", raw))?;
            }
        }
        if !db_fsync_ms_set {
            if let Some(raw) = last("dbfsyncms") {
                db_fsync_ms = parse_fsync_ms(raw).ok_or_else(|| invalid("dbfsyncms", raw))?;
            }
        }
        if !log_level_set {
            if let Some(raw) = last("loglevel") {
                log_level = logging::Level::parse(raw).ok_or_else(|| invalid("loglevel", raw))?;
            }
        }
        if !log_format_set {
            if let Some(raw) = last("logformat") {
                log_format = logging::Format::parse(raw).ok_or_else(|| invalid("logformat", raw))?;
            }
        }
        if !log_timestamps_set {
            if let Some(raw) = last("logtimestamps") {
                log_timestamps = parse_conf_bool(raw).ok_or_else(|| invalid("logtimestamps", raw))?;
            }
        }
        if !upgrade_index {
            if let Some(raw) = last("upgradeindex") {
                upgrade_index = parse_conf_bool(raw).ok_or_else(|| invalid("upgradeindex", raw))?;
            }
        }

        const SUPPORTED: [&str; 14] = [
            "network",
            "testnet",
            "regtest",
            "backend",
            "dbbatchsize",
            "dbcache",
            "dbwritebuffer",
            "dbjournal",
            "dbmemtable",
            "dbfsyncms",
            "loglevel",
            "logformat",
            "logtimestamps",
            "upgradeindex",
        ];
        unsupported_conf_keys = conf
            .keys()
            .filter(|key| !SUPPORTED.contains(&key.as_str()))
            .cloned()
            .collect();
        unsupported_conf_keys.sort();
    }

    Ok(CliAction::Run(Config {
        backend,
        data_dir,
        conf_path: conf_file,
        network,
        db_batch_size,
        db_cache_bytes: db_cache_mb.saturating_mul(MB),
        db_write_buffer_bytes: db_write_buffer_mb.saturating_mul(MB),
        db_journal_bytes: db_journal_mb.saturating_mul(MB),
        db_memtable_bytes,
        db_fsync_ms,
        log_level,
        log_format,
        log_timestamps,
        upgrade_index,
        query,
        unsupported_conf_keys,
    }))
}

fn set_query(query: &mut Option<Query>, next: Query) -> Result<(), String> {
    if query.is_some() {
        return Err(format!("only one query may be given per run\n{}", usage()));
    }
    *query = Some(next);
    Ok(())
}

/// Reads `key=value` lines; a missing file is not an error. Keys are
/// lower-cased and every occurrence is kept in order.
fn load_qitd_conf(path: &Path) -> Result<Option<HashMap<String, Vec<String>>>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for raw_line in contents.lines() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    Ok(Some(out))
}

fn parse_conf_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Some(true);
    }
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_batch_size(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|size| *size > 0)
}

/// Memtable sizes are handed to fjall as `u32` bytes.
fn parse_memtable_mb(value: &str) -> Option<u32> {
    let mb = value.trim().parse::<u64>().ok()?;
    u32::try_from(mb.checked_mul(MB)?).ok()
}

/// `0` leaves journal syncing to fjall's default.
fn parse_fsync_ms(value: &str) -> Option<Option<u16>> {
    let ms = value.trim().parse::<u16>().ok()?;
    Some((ms != 0).then_some(ms))
}

fn usage() -> String {
    [
        "Usage: qitd [OPTIONS] [QUERY]",
        "",
        "Options:",
        "  --data-dir <path>            Data directory (default: ./data)",
        "  --conf <path>                Config file (default: <data-dir>/qitd.conf)",
        "  --network <name>             mainnet|testnet|regtest (default: mainnet)",
        "  --backend <name>             memory|fjall (default: fjall)",
        "  --db-batch-size <bytes>      Coin database write batch threshold (default: 16777216)",
        "  --db-cache-mb <n>            Fjall block cache size (default: 256)",
        "  --db-write-buffer-mb <n>     Fjall write buffer limit (default: 2048)",
        "  --db-journal-mb <n>          Fjall journal size limit (default: 2048)",
        "  --db-memtable-mb <n>         Fjall memtable size per partition (default: 64)",
        "  --db-fsync-ms <n>            Fjall journal fsync interval, 0 = fjall default (default: 0)",
        "  --log-level <level>          error|warn|info|debug|trace (default: info)",
        "  --log-format <format>        text|json (default: text)",
        "  --log-timestamps             Prefix text log lines with timestamps (default)",
        "  --no-log-timestamps          Omit timestamps from text log lines",
        "  --upgrade-index              Rebuild every account index from the coin table",
        "",
        "Queries (JSON on stdout):",
        "  --balance <account-hex>",
        "  --bindings-for-account <account-hex>",
        "  --bindings-for-plotter <plotter-id>",
        "  --top-staking <n>",
        "  --staking-pools <epoch-hash-hex>",
        "  --plotter-id <passphrase>",
        "  --farmer-id <passphrase>",
        "",
        "  help | --help                Print this message",
        "  version | --version          Print the version",
    ]
    .join("\n")
}
