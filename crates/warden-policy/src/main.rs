use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use warden_policy::config::Config;
use warden_policy::connector::{self, ConnectOptions};
use warden_policy::logging::init_logging;
use warden_policy::parser::parse_structured_text;
use warden_policy::rules::{merge_rules, Phase, RequestContext, Rule, RuleSet};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Inspect rule parsing, rule composition and origin connections")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "WARDEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a rule body and print the structured value
    Parse {
        /// Rule body text
        #[arg(required_unless_present = "file")]
        text: Option<String>,
        /// Read the rule body from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// Merge rule layers and print the effective rules and directives
    Compose {
        /// Base rules: mapping of protocol name to matcher(s)
        #[arg(long)]
        rules: PathBuf,
        /// Rules merged on top of the base rules
        #[arg(long)]
        additions: Option<PathBuf>,
        /// Compose for the response phase
        #[arg(long)]
        response: bool,
    },
    /// Open an origin connection using the retry policy
    Connect {
        host: String,
        port: u16,
        /// Use TLS even without ALPN protocols
        #[arg(long)]
        tls: bool,
        /// ALPN protocol to offer (repeatable, implies TLS)
        #[arg(long)]
        alpn: Vec<String>,
        /// Cipher offered on the first attempt
        #[arg(long)]
        cipher: Option<String>,
        /// Rules file whose `cipher` rule picks the retry cipher
        #[arg(long)]
        rules: Option<PathBuf>,
        /// SNI override
        #[arg(long)]
        server_name: Option<String>,
        /// Accept any origin certificate
        #[arg(long)]
        insecure: bool,
    },
}

/// Matchers of one protocol in a rules file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Matchers {
    One(String),
    Many(Vec<String>),
}

fn load_rule_set(path: &Path) -> Result<RuleSet, anyhow::Error> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file '{}'", path.display()))?;
    let entries: BTreeMap<String, Matchers> = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse rules file '{}'", path.display()))?;

    let mut rules = RuleSet::new();
    for (name, matchers) in entries {
        let rule = match matchers {
            Matchers::One(matcher) => Some(Rule::new(name.as_str(), matcher)),
            Matchers::Many(list) => Rule::from_matchers(&name, list),
        };
        if let Some(rule) = rule {
            rules.insert(rule);
        }
    }
    Ok(rules)
}

fn run_parse(text: Option<String>, file: Option<PathBuf>) -> Result<(), anyhow::Error> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?,
        (None, None) => anyhow::bail!("either TEXT or --file is required"),
    };

    let value = parse_structured_text(&text).unwrap_or(serde_json::Value::String(text));
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_compose(rules: &Path, additions: Option<&Path>, response: bool) -> Result<(), anyhow::Error> {
    let mut ctx = RequestContext::new(load_rule_set(rules)?);
    let additions = additions.map(load_rule_set).transpose()?;
    let phase = if response { Phase::Response } else { Phase::Request };

    let applied = merge_rules(&mut ctx, additions.as_ref(), phase);
    let report = serde_json::json!({
        "applied": applied.names(),
        "rules": ctx.rules,
        "directives": ctx.directives,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_connect(options: ConnectOptions, config: &Config) -> Result<(), anyhow::Error> {
    let mut stream = connector::connect(&options, &config.connector).await?;

    println!("connected: {}", options.target());
    if let Ok(peer) = stream.peer_addr() {
        println!("peer: {peer}");
    }
    println!("tls: {}", stream.is_tls());
    if let Some(alpn) = stream.alpn_protocol() {
        println!("alpn: {}", String::from_utf8_lossy(alpn));
    }
    if let Some(suite) = stream.cipher_suite() {
        println!("cipher: {suite}");
    }

    stream.shutdown().await.ok();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };
    init_logging(&config.logging)?;

    match cli.command {
        Command::Parse { text, file } => run_parse(text, file),
        Command::Compose {
            rules,
            additions,
            response,
        } => run_compose(&rules, additions.as_deref(), response),
        Command::Connect {
            host,
            port,
            tls,
            alpn,
            cipher,
            rules,
            server_name,
            insecure,
        } => {
            let mut options = ConnectOptions::new(host, port);
            if tls || !alpn.is_empty() {
                options = options.with_alpn(alpn);
            }
            if let Some(cipher) = cipher {
                options = options.with_ciphers(cipher);
            }
            if let Some(path) = rules {
                options = options.with_rules(load_rule_set(&path)?);
            }
            if let Some(name) = server_name {
                options = options.with_server_name(name);
            }
            options.skip_verify = insecure;
            run_connect(options, &config).await
        }
    }
}
