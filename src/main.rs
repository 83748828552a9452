//! Command-line front end for the keytab engine
//!
//! Maps library error kinds to stable exit codes: 0 success, 2 usage
//! (clap), 3 parse/format, 4 derivation, 5 risk gate, 6 I/O,
//! 7 protection.

use std::{path::PathBuf, process::ExitCode};

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use keytab::{
    Compatibility, ConflictPolicy, Error, Etype, ExternalKey, FileScopeKeyProvider, KeytabBuilder,
    Password, Principal, ProtectionScope, WriteOptions,
};
use log::warn;

#[derive(Parser)]
#[command(
    name = "keytab",
    version,
    about = "Produce, inspect, compare, merge, and protect MIT-format Kerberos keytabs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a keytab from externally supplied raw keys (replication path)
    #[command(name = "new-keytab")]
    NewKeytab(NewKeytabArgs),
    /// Build a keytab by deriving keys from a password
    #[command(name = "new-keytab-from-password")]
    NewKeytabFromPassword(NewFromPasswordArgs),
    /// Parse a keytab and dump its entries
    #[command(name = "read-keytab")]
    ReadKeytab(ReadArgs),
    /// Structurally diff two keytabs
    #[command(name = "compare-keytab")]
    CompareKeytab(CompareArgs),
    /// Union keytabs under a conflict policy
    #[command(name = "merge-keytab")]
    MergeKeytab(MergeArgs),
    /// Run the structural self-check on a keytab
    #[command(name = "test-keytab")]
    TestKeytab(TestArgs),
    /// Wrap a keytab for at-rest protection
    #[command(name = "protect-keytab")]
    ProtectKeytab(ProtectArgs),
    /// Unwrap a protected keytab
    #[command(name = "unprotect-keytab")]
    UnprotectKeytab(UnprotectArgs),
}

#[derive(Args)]
struct NewKeytabArgs {
    /// SamAccountName of the account; `NAME$` marks a computer account
    #[arg(long)]
    sam_account_name: String,
    /// DNS domain of the account, used as the realm
    #[arg(long)]
    domain: String,
    /// Raw key as `etype=18,kvno=3,key=<hex>[,timestamp=<unix>]`; repeatable
    #[arg(long = "key", value_parser = parse_key_spec, required = true)]
    keys: Vec<ExternalKey>,
    /// Where to write the keytab
    #[arg(long)]
    output: PathBuf,
    /// Emit legacy rc4-hmac keys
    #[arg(long)]
    include_legacy_rc4: bool,
    /// Include keys for the previous KVNO
    #[arg(long)]
    include_old_kvno: bool,
    /// Include keys for the KVNO before the previous one
    #[arg(long)]
    include_older_kvno: bool,
    /// Acknowledge the risk of sensitive keytab shapes (krbtgt multi-KVNO)
    #[arg(long)]
    acknowledge_risk: bool,
    /// Why a risk-gated keytab is being produced
    #[arg(long)]
    justification: Option<String>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("subject").required(true).args(["principal", "sam_account_name"])))]
struct NewFromPasswordArgs {
    /// Full principal, `c1/c2@REALM`
    #[arg(long, conflicts_with_all = ["sam_account_name", "realm"])]
    principal: Option<String>,
    /// SamAccountName; requires --realm
    #[arg(long, requires = "realm")]
    sam_account_name: Option<String>,
    /// Realm for --sam-account-name
    #[arg(long)]
    realm: Option<String>,
    /// Password to derive keys from
    #[arg(long)]
    password: String,
    /// Etypes to derive, by name or number, comma separated
    #[arg(long = "include-etype", value_delimiter = ',')]
    include_etype: Vec<Etype>,
    /// PBKDF2 iteration count override
    #[arg(long)]
    iterations: Option<u32>,
    /// Key version number (default 1)
    #[arg(long)]
    kvno: Option<u32>,
    /// Salt construction regime
    #[arg(long, default_value = "MIT")]
    compatibility: Compatibility,
    /// Explicit salt (literal bytes), bypassing the compatibility policy
    #[arg(long)]
    salt: Option<String>,
    /// Emit legacy rc4-hmac keys
    #[arg(long)]
    include_legacy_rc4: bool,
    /// Where to write the keytab
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct ReadArgs {
    /// Keytab to read
    #[arg(long)]
    path: PathBuf,
    /// Print key bytes instead of masking them
    #[arg(long)]
    reveal_keys: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// Left keytab
    #[arg(long)]
    left: PathBuf,
    /// Right keytab
    #[arg(long)]
    right: PathBuf,
    /// Compare under Windows-compat normalization
    #[arg(long)]
    normalize: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Keytabs to merge, comma separated, merged left to right
    #[arg(long, value_delimiter = ',', required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
    /// What to do when inputs disagree on a key
    #[arg(long, value_enum, default_value_t = OnConflict::Fail)]
    on_conflict: OnConflict,
    /// Where to write the merged keytab
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct TestArgs {
    /// Keytab to check
    #[arg(long)]
    path: PathBuf,
    /// Print a per-record report
    #[arg(long)]
    detailed: bool,
}

#[derive(Args)]
struct ProtectArgs {
    /// Keytab to protect
    #[arg(long)]
    path: PathBuf,
    /// Protection scope
    #[arg(long, default_value = "current-user")]
    scope: ProtectionScope,
    /// Additional entropy mixed into the wrapping key
    #[arg(long)]
    entropy: Option<String>,
    /// Narrow the output file's permissions to the invoking user
    #[arg(long)]
    restrict_acl: bool,
    /// Overwrite and remove the plaintext keytab afterwards
    #[arg(long)]
    delete_plaintext: bool,
    /// Where to write the container (default: `<path>.protected`)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct UnprotectArgs {
    /// Protected container to unwrap
    #[arg(long)]
    path: PathBuf,
    /// Protection scope the container was wrapped for
    #[arg(long, default_value = "current-user")]
    scope: ProtectionScope,
    /// Entropy the container was wrapped with
    #[arg(long)]
    entropy: Option<String>,
    /// Narrow the output file's permissions to the invoking user
    #[arg(long)]
    restrict_acl: bool,
    /// Where to write the keytab (default: `<path>` without `.protected`)
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Conflict policy names as the CLI spells them
#[derive(Copy, Clone, Debug, ValueEnum)]
enum OnConflict {
    /// Keep the key from the earlier input
    PreferFirst,
    /// Take the key from the later input
    PreferLast,
    /// Refuse to merge
    Fail,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(on_conflict: OnConflict) -> Self {
        match on_conflict {
            OnConflict::PreferFirst => Self::PreferA,
            OnConflict::PreferLast => Self::PreferB,
            OnConflict::Fail => Self::Fail,
        }
    }
}

fn parse_key_spec(spec: &str) -> Result<ExternalKey, String> {
    let mut etype = None;
    let mut kvno = None;
    let mut key = None;
    let mut timestamp = None;
    for part in spec.split(',') {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got {part:?}"))?;
        match name {
            "etype" => {
                let code = value
                    .parse::<u16>()
                    .or_else(|_| value.parse::<Etype>().map(Etype::code))
                    .map_err(|_| format!("unknown etype {value:?}"))?;
                etype = Some(code);
            }
            "kvno" => {
                kvno = Some(
                    value
                        .parse::<u32>()
                        .map_err(|error| format!("bad kvno {value:?}: {error}"))?,
                );
            }
            "key" => {
                key = Some(
                    hex::decode(value).map_err(|error| format!("bad key hex: {error}"))?,
                );
            }
            "timestamp" => {
                timestamp = Some(
                    value
                        .parse::<u32>()
                        .map_err(|error| format!("bad timestamp {value:?}: {error}"))?,
                );
            }
            other => return Err(format!("unknown key field {other:?}")),
        }
    }
    Ok(ExternalKey {
        etype: etype.ok_or("missing etype=")?,
        kvno: kvno.ok_or("missing kvno=")?,
        key: key.ok_or("missing key=")?,
        timestamp,
    })
}

fn exit_code_for(error: &Error) -> u8 {
    match error {
        Error::ParseError { .. }
        | Error::MalformedKeytab { .. }
        | Error::InvalidPrincipal { .. }
        | Error::KeyLengthMismatch { .. }
        | Error::MergeConflict { .. } => 3,
        Error::UnsupportedEtype { .. }
        | Error::InvalidIterationCount
        | Error::DerivationFailed { .. } => 4,
        Error::RiskNotAcknowledged => 5,
        Error::IoError { .. } => 6,
        Error::ProtectionError { .. } => 7,
        _ => 1,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(exit_code_for(&error))
        }
    }
}

fn run(command: Command) -> keytab::error::Result<ExitCode> {
    match command {
        Command::NewKeytab(args) => new_keytab(args),
        Command::NewKeytabFromPassword(args) => new_keytab_from_password(args),
        Command::ReadKeytab(args) => read_keytab(args),
        Command::CompareKeytab(args) => compare_keytab(args),
        Command::MergeKeytab(args) => merge_keytab(args),
        Command::TestKeytab(args) => test_keytab(args),
        Command::ProtectKeytab(args) => protect_keytab(args),
        Command::UnprotectKeytab(args) => unprotect_keytab(args),
    }
}

fn new_keytab(args: NewKeytabArgs) -> keytab::error::Result<ExitCode> {
    let principal = Principal::from_sam_account_name(&args.sam_account_name, &args.domain)?;
    let mut builder = KeytabBuilder::from_external_keys(principal, args.keys)
        .include_legacy_rc4(args.include_legacy_rc4)
        .include_old_kvno(args.include_old_kvno)
        .include_older_kvno(args.include_older_kvno)
        .acknowledge_risk(args.acknowledge_risk);
    if let Some(justification) = args.justification {
        builder = builder.justification(justification);
    }
    let keytab = builder.build()?;
    keytab::write(&args.output, &keytab, &WriteOptions::default())?;
    println!(
        "wrote {} entries to {}",
        keytab.entries().len(),
        args.output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn new_keytab_from_password(args: NewFromPasswordArgs) -> keytab::error::Result<ExitCode> {
    let principal = match (&args.principal, &args.sam_account_name, &args.realm) {
        (Some(text), _, _) => Principal::parse(text)?,
        (None, Some(sam), Some(realm)) => Principal::from_sam_account_name(sam, realm)?,
        // clap's arg group guarantees one of the two shapes
        _ => unreachable!(),
    };
    let mut builder = KeytabBuilder::from_password(principal, Password::new(args.password))
        .compatibility(args.compatibility)
        .include_legacy_rc4(args.include_legacy_rc4);
    if !args.include_etype.is_empty() {
        builder = builder.etypes(args.include_etype);
    }
    if let Some(iterations) = args.iterations {
        builder = builder.iterations(iterations);
    }
    if let Some(kvno) = args.kvno {
        builder = builder.kvno(kvno);
    }
    if let Some(salt) = args.salt {
        builder = builder.salt(salt.into_bytes());
    }
    let keytab = builder.build()?;
    keytab::write(&args.output, &keytab, &WriteOptions::default())?;
    println!(
        "wrote {} entries to {}",
        keytab.entries().len(),
        args.output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn read_keytab(args: ReadArgs) -> keytab::error::Result<ExitCode> {
    let keytab = keytab::read(&args.path)?;
    if args.reveal_keys {
        warn!("revealing key material; treat this output as a credential");
    }
    println!("{}: {} entries", args.path.display(), keytab.entries().len());
    for (index, entry) in keytab.entries().iter().enumerate() {
        let etype = entry
            .known_etype()
            .map_or_else(|| format!("etype {}", entry.etype()), |e| e.to_string());
        let when = entry
            .timestamp_utc()
            .map_or_else(|| "-".to_owned(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        let key = if args.reveal_keys {
            entry.key().to_hex()
        } else {
            format!("<{} bytes>", entry.key().len())
        };
        println!(
            "{index:3}  kvno {:5}  {etype:28}  {}  {when}  {key}",
            entry.kvno(),
            entry.principal(),
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn compare_keytab(args: CompareArgs) -> keytab::error::Result<ExitCode> {
    let left = keytab::read(&args.left)?;
    let right = keytab::read(&args.right)?;
    let diff = keytab::compare(&left, &right, args.normalize);
    if diff.is_identical() {
        println!("keytabs are identical");
        return Ok(ExitCode::SUCCESS);
    }
    for identity in &diff.only_in_a {
        println!("only in {}: {identity}", args.left.display());
    }
    for identity in &diff.only_in_b {
        println!("only in {}: {identity}", args.right.display());
    }
    for matched in &diff.in_both {
        if matched.keys_equal {
            println!("in both, keys equal: {}", matched.identity);
        } else {
            println!("in both, KEYS DIFFER: {}", matched.identity);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn merge_keytab(args: MergeArgs) -> keytab::error::Result<ExitCode> {
    let mut keytabs = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        keytabs.push(keytab::read(input)?);
    }
    let merged = keytab::merge_all(&keytabs, args.on_conflict.into())?;
    keytab::write(&args.output, &merged, &WriteOptions::default())?;
    println!(
        "merged {} inputs into {} ({} entries)",
        args.inputs.len(),
        args.output.display(),
        merged.entries().len()
    );
    Ok(ExitCode::SUCCESS)
}

fn test_keytab(args: TestArgs) -> keytab::error::Result<ExitCode> {
    let keytab = keytab::read(&args.path)?;
    let report = keytab::self_check(&keytab);
    if args.detailed {
        for record in &report.records {
            let verdict = if record.passed() { "ok" } else { "FAIL" };
            let key_len = match record.key_len_ok {
                Some(true) => "key length ok",
                Some(false) => "key length MISMATCH",
                None => "unknown etype, key length unchecked",
            };
            println!(
                "{:3}  {verdict:4}  kvno {:5}  etype {:3}  {}  ({key_len})",
                record.index, record.kvno, record.etype, record.principal
            );
        }
    }
    if report.passed() {
        println!(
            "{}: ok ({} records)",
            args.path.display(),
            report.records.len()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}: structural check FAILED", args.path.display());
        Ok(ExitCode::from(3))
    }
}

fn protect_keytab(args: ProtectArgs) -> keytab::error::Result<ExitCode> {
    let plaintext = keytab::read_bytes(&args.path)?;
    let provider = FileScopeKeyProvider::new()?;
    let wrapped = keytab::protect(
        &plaintext,
        args.scope,
        args.entropy.as_deref().map(str::as_bytes),
        &provider,
    )?;
    let output = args
        .output
        .unwrap_or_else(|| with_protected_suffix(&args.path));
    keytab::write_bytes(&output, &wrapped)?;
    if args.restrict_acl {
        if let Some(warning) = keytab::restrict_acl(&output)? {
            warn!("{warning}");
        }
    }
    if args.delete_plaintext {
        keytab::shred(&args.path)?;
    }
    println!("protected {} -> {}", args.path.display(), output.display());
    Ok(ExitCode::SUCCESS)
}

fn unprotect_keytab(args: UnprotectArgs) -> keytab::error::Result<ExitCode> {
    let wrapped = keytab::read_bytes(&args.path)?;
    let provider = FileScopeKeyProvider::new()?;
    let plaintext = keytab::unprotect(
        &wrapped,
        args.scope,
        args.entropy.as_deref().map(str::as_bytes),
        &provider,
    )?;
    let output = args
        .output
        .unwrap_or_else(|| without_protected_suffix(&args.path));
    keytab::write_bytes(&output, &plaintext)?;
    if args.restrict_acl {
        if let Some(warning) = keytab::restrict_acl(&output)? {
            warn!("{warning}");
        }
    }
    println!("unprotected {} -> {}", args.path.display(), output.display());
    Ok(ExitCode::SUCCESS)
}

fn with_protected_suffix(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".protected");
    PathBuf::from(name)
}

fn without_protected_suffix(path: &std::path::Path) -> PathBuf {
    let text = path.as_os_str().to_string_lossy();
    match text.strip_suffix(".protected") {
        Some(stripped) => PathBuf::from(stripped.to_owned()),
        None => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".keytab");
            PathBuf::from(name)
        }
    }
}
