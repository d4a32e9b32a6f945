use crate::domain::{Host, HostRepository, DEFAULT_PORT};
use crate::errors::{ErrorContext, Result, SshbookError};
use crate::utils::write_atomic;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `Key Value`, `Key=Value` or `Key = Value`, with leading indentation kept
static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)([A-Za-z][A-Za-z0-9]*)(?:\s*=\s*|\s+)(.*?)\s*$")
        .expect("directive pattern is valid")
});

static OPTION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("option key pattern is valid"));

const DEFAULT_INDENT: &str = "    ";

/// Directives taking one path argument; only these get quoted when they hold spaces
const SINGLE_PATH: [&str; 4] = ["identityfile", "certificatefile", "controlpath", "identityagent"];

/// Directives mapped onto `Host` fields, with their canonical spelling
const MODELED: [(&str, &str); 5] = [
    ("hostname", "HostName"),
    ("user", "User"),
    ("port", "Port"),
    ("identityfile", "IdentityFile"),
    ("proxyjump", "ProxyJump"),
];

/// A profile line that was skipped while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone)]
enum Slot {
    /// Comment, blank line or repeated directive, written back untouched
    Verbatim(String),
    /// A directive feeding a `Host` field or option, with the line it came from
    Directive {
        key: String,
        name: String,
        raw: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
struct HostBlock {
    /// Original header line; `None` for blocks added since parsing
    header: Option<String>,
    indent: String,
    host: Host,
    layout: Vec<Slot>,
}

#[derive(Debug, Clone)]
enum Block {
    Host(HostBlock),
    /// `Match` blocks and `Host` blocks with patterns, kept as written
    Opaque(Vec<String>),
}

/// Registry of the host blocks in an OpenSSH-style client config file.
///
/// Everything the registry does not model (comments, blank lines, repeated
/// directives, wildcard and `Match` blocks, lines before the first block)
/// is written back verbatim and in place on `save`.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    path: PathBuf,
    preamble: Vec<String>,
    blocks: Vec<Block>,
    keys: BTreeSet<String>,
    warnings: Vec<ParseWarning>,
    /// Line ending of the parsed file, reused on render
    eol: &'static str,
    final_newline: bool,
}

impl HostRegistry {
    /// Parse the profile file at `path`; a missing file yields an empty registry
    pub fn parse(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(SshbookError::Corrupt(format!(
                    "{} is not valid UTF-8",
                    path.display()
                )))
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        Ok(Self::parse_str(path, &text))
    }

    /// Parse profile text that will be saved to `path`
    pub fn parse_str(path: impl Into<PathBuf>, text: &str) -> Self {
        let mut registry = Self {
            path: path.into(),
            preamble: Vec::new(),
            blocks: Vec::new(),
            keys: BTreeSet::new(),
            warnings: Vec::new(),
            eol: detect_eol(text),
            final_newline: text.is_empty() || text.ends_with('\n'),
        };

        for (idx, line) in text.lines().enumerate() {
            registry.parse_line(idx + 1, line);
        }

        for warning in &registry.warnings {
            tracing::warn!(path = %registry.path.display(), "skipping {}", warning);
        }

        registry.refresh_keys();
        registry
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.warnings.push(ParseWarning {
            line,
            message: message.into(),
        });
    }

    fn push_verbatim(&mut self, line: &str) {
        match self.blocks.last_mut() {
            None => self.preamble.push(line.to_string()),
            Some(Block::Opaque(lines)) => lines.push(line.to_string()),
            Some(Block::Host(block)) => block.layout.push(Slot::Verbatim(line.to_string())),
        }
    }

    fn parse_line(&mut self, number: usize, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            self.push_verbatim(line);
            return;
        }

        let caps = match DIRECTIVE.captures(line) {
            Some(caps) => caps,
            None => {
                self.warn(number, format!("unrecognized line {:?}", trimmed));
                return;
            }
        };

        let indent = caps.get(1).map_or("", |m| m.as_str());
        let name = caps.get(2).map_or("", |m| m.as_str());
        let value = unquote(caps.get(3).map_or("", |m| m.as_str()));
        let key = name.to_ascii_lowercase();

        match key.as_str() {
            "host" => {
                let patterns: Vec<&str> = value
                    .split_whitespace()
                    .take_while(|token| !token.starts_with('#'))
                    .collect();
                match patterns.as_slice() {
                    [] => self.warn(number, "Host without an alias"),
                    [alias] if self.position(alias).is_some() => {
                        self.warn(number, format!("duplicate Host {}, ssh uses the first block", alias));
                        self.blocks.push(Block::Opaque(vec![line.to_string()]));
                    }
                    [alias] if !is_pattern(alias) => {
                        self.blocks.push(Block::Host(HostBlock {
                            header: Some(line.to_string()),
                            indent: String::new(),
                            host: Host::new(*alias, ""),
                            layout: Vec::new(),
                        }));
                    }
                    _ => self.blocks.push(Block::Opaque(vec![line.to_string()])),
                }
            }
            "match" => self.blocks.push(Block::Opaque(vec![line.to_string()])),
            _ if value.is_empty() => self.warn(number, format!("{} has no value", name)),
            _ => {
                let outcome = match self.blocks.last_mut() {
                    Some(Block::Host(block)) => block.apply(indent, name, &key, value, line),
                    _ => {
                        self.push_verbatim(line);
                        Ok(())
                    }
                };
                if let Err(message) = outcome {
                    self.warn(number, message);
                }
            }
        }
    }

    fn refresh_keys(&mut self) {
        self.keys = self
            .hosts()
            .filter_map(|host| host.identity_file.as_ref())
            .map(|path| path.display().to_string())
            .collect();
    }

    fn position(&self, alias: &str) -> Option<usize> {
        self.blocks.iter().position(|block| match block {
            Block::Host(b) => b.host.alias == alias,
            Block::Opaque(_) => false,
        })
    }

    /// Hosts in file order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Host(b) => Some(&b.host),
            Block::Opaque(_) => None,
        })
    }

    /// Lines skipped by the last parse
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Render the registry in the profile file format
    pub fn to_config_string(&self) -> String {
        let mut out = self.preamble.clone();

        for block in &self.blocks {
            match block {
                Block::Opaque(lines) => out.extend(lines.iter().cloned()),
                Block::Host(block) => {
                    if block.header.is_none() && out.last().is_some_and(|l| !l.trim().is_empty()) {
                        out.push(String::new());
                    }
                    block.render(&mut out);
                }
            }
        }

        let mut text = out.join(self.eol);
        if !out.is_empty() && self.final_newline {
            text.push_str(self.eol);
        }
        text
    }
}

impl HostBlock {
    fn has_directive(&self, key: &str) -> bool {
        self.layout
            .iter()
            .any(|slot| matches!(slot, Slot::Directive { key: k, .. } if k == key))
    }

    fn apply(&mut self, indent: &str, name: &str, key: &str, value: &str, raw: &str) -> std::result::Result<(), String> {
        // ssh uses the first occurrence; later ones are only carried along
        if self.has_directive(key) {
            self.layout.push(Slot::Verbatim(raw.to_string()));
            return Ok(());
        }

        let host = &mut self.host;
        match key {
            "hostname" => host.hostname = value.to_string(),
            "user" => host.user = Some(value.to_string()),
            "port" => {
                if value.parse::<u16>().is_err() {
                    return Err(format!("invalid port {:?}", value));
                }
                host.port = value.to_string();
            }
            "identityfile" => host.identity_file = Some(PathBuf::from(value)),
            "proxyjump" => host.jump_host = Some(value.to_string()),
            _ => {
                host.options.insert(name, value);
            }
        }

        if self.indent.is_empty() {
            self.indent = indent.to_string();
        }
        self.layout.push(Slot::Directive {
            key: key.to_string(),
            name: name.to_string(),
            raw: raw.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn render(&self, out: &mut Vec<String>) {
        out.push(
            self.header
                .clone()
                .unwrap_or_else(|| format!("Host {}", self.host.alias)),
        );

        let indent = if self.indent.is_empty() {
            DEFAULT_INDENT
        } else {
            self.indent.as_str()
        };

        let mut body = Vec::with_capacity(self.layout.len());
        let mut seen = HashSet::new();
        let mut insert_at = 0;

        for slot in &self.layout {
            match slot {
                Slot::Verbatim(line) => body.push(line.clone()),
                Slot::Directive { key, name, raw, value } => {
                    seen.insert(key.as_str());
                    match current_value(&self.host, key) {
                        Some(current) if current == *value => body.push(raw.clone()),
                        Some(current) => body.push(format_directive(indent, key, name, &current)),
                        None => {}
                    }
                    insert_at = body.len();
                }
            }
        }

        let mut added = Vec::new();
        for (key, name) in MODELED {
            if seen.contains(key) || (key == "port" && self.host.port == DEFAULT_PORT) {
                continue;
            }
            if let Some(value) = current_value(&self.host, key) {
                added.push(format_directive(indent, key, name, &value));
            }
        }
        for (name, value) in self.host.options.iter() {
            let key = name.to_ascii_lowercase();
            if !seen.contains(key.as_str()) {
                added.push(format_directive(indent, &key, name, value));
            }
        }

        body.splice(insert_at..insert_at, added);
        out.extend(body);
    }
}

/// Value a directive should carry for `host`, `None` when unset
fn current_value(host: &Host, key: &str) -> Option<String> {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    match key {
        "hostname" => non_empty(&host.hostname),
        "user" => host.user.as_deref().and_then(non_empty),
        "port" => non_empty(&host.port),
        "identityfile" => host
            .identity_file
            .as_ref()
            .map(|p| p.display().to_string())
            .and_then(|p| non_empty(&p)),
        "proxyjump" => host.jump_host.as_deref().and_then(non_empty),
        other => host.options.get(other).map(str::to_string),
    }
}

/// Multi-argument values such as `LocalForward 8080 localhost:80` stay unquoted
fn format_directive(indent: &str, key: &str, name: &str, value: &str) -> String {
    let needs_quotes = SINGLE_PATH.contains(&key)
        && value.chars().any(char::is_whitespace)
        && !(value.starts_with('"') && value.ends_with('"'));
    if needs_quotes {
        format!("{}{} \"{}\"", indent, name, value)
    } else {
        format!("{}{} {}", indent, name, value)
    }
}

/// `\r\n` when the first line ends that way, `\n` otherwise
fn detect_eol(text: &str) -> &'static str {
    match text.find('\n') {
        Some(idx) if text[..idx].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn is_pattern(alias: &str) -> bool {
    alias.contains(['*', '?', '!'])
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

/// Reject hosts that could not be written and parsed back unchanged
fn validate(host: &Host) -> Result<()> {
    if host.alias.is_empty() {
        return Err(SshbookError::Validation("alias must not be empty".to_string()));
    }
    if host.alias.chars().any(char::is_whitespace) || is_pattern(&host.alias) || host.alias.starts_with('#') {
        return Err(SshbookError::Validation(format!(
            "alias {:?} must be a single name without wildcards",
            host.alias
        )));
    }
    if !host.port.is_empty() && host.port.parse::<u16>().is_err() {
        return Err(SshbookError::Validation(format!("invalid port {:?}", host.port)));
    }

    let fields = [
        Some(host.hostname.as_str()),
        host.user.as_deref(),
        host.jump_host.as_deref(),
    ];
    let identity = host.identity_file.as_ref().map(|p| p.display().to_string());
    if fields.iter().flatten().any(|v| has_line_break(v))
        || identity.as_deref().is_some_and(has_line_break)
    {
        return Err(SshbookError::Validation(format!(
            "host {} has a value spanning several lines",
            host.alias
        )));
    }

    for (key, value) in host.options.iter() {
        let lower = key.to_ascii_lowercase();
        if !OPTION_KEY.is_match(key)
            || lower == "host"
            || lower == "match"
            || MODELED.iter().any(|(k, _)| *k == lower)
        {
            return Err(SshbookError::Validation(format!("{:?} cannot be used as an option", key)));
        }
        if value.is_empty() || has_line_break(value) {
            return Err(SshbookError::Validation(format!("option {} needs a single-line value", key)));
        }
    }

    Ok(())
}

impl HostRepository for HostRegistry {
    fn get(&self, alias: &str) -> Option<&Host> {
        self.hosts().find(|host| host.alias == alias)
    }

    fn add(&mut self, mut host: Host) -> Result<()> {
        if host.port.trim().is_empty() {
            host.port = DEFAULT_PORT.to_string();
        }
        validate(&host)?;

        match self.position(&host.alias) {
            Some(idx) => {
                if let Block::Host(block) = &mut self.blocks[idx] {
                    block.host = host;
                }
            }
            None => self.blocks.push(Block::Host(HostBlock {
                header: None,
                indent: String::new(),
                host,
                layout: Vec::new(),
            })),
        }

        self.refresh_keys();
        Ok(())
    }

    fn remove(&mut self, alias: &str) -> Option<Host> {
        let idx = self.position(alias)?;
        let removed = match self.blocks.remove(idx) {
            Block::Host(block) => Some(block.host),
            Block::Opaque(_) => None,
        };
        self.refresh_keys();
        removed
    }

    fn get_all(&self) -> IndexMap<&str, &Host> {
        self.hosts().map(|host| (host.alias.as_str(), host)).collect()
    }

    fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    fn save(&self) -> Result<()> {
        write_atomic(&self.path, self.to_config_string().as_bytes())?;
        tracing::info!(path = %self.path.display(), hosts = self.hosts().count(), "saved ssh config");
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
