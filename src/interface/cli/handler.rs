use crate::application::{AppContext, Direction, HostDetails};
use crate::domain::{Host, HostRepository, Record, DEFAULT_PORT};
use crate::errors::SshbookError;
use crate::interface::cli::commands::{parse_option, AddArgs, Commands, TransferArgs};
use console::style;
use dialoguer::{Confirm, Input, MultiSelect, Password, Select};
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub struct CommandHandler {
    ctx: AppContext,
    verbose: bool,
    interactive: bool,
}

impl CommandHandler {
    /// Create a handler; prompts are only shown when a terminal is attached
    pub fn new(ctx: AppContext, verbose: bool) -> Self {
        let interactive = console::user_attended() && io::stdin().is_terminal();
        Self {
            ctx,
            verbose,
            interactive,
        }
    }

    /// Handle a CLI command
    pub async fn handle_command(&mut self, command: Commands) -> anyhow::Result<()> {
        if uses_keychain(&command) {
            self.prepare_keychain()?;
        }

        match command {
            Commands::Add(args) => self.handle_add(args)?,
            Commands::Remove { alias, yes } => self.handle_remove(&alias, yes)?,
            Commands::List => self.handle_list(),
            Commands::Show { alias } => self.handle_show(&alias)?,
            Commands::To { alias } => {
                let alias = self.pick_host(alias)?;
                self.handle_to(&alias).await?
            }
            Commands::At { aliases, command } => {
                let aliases = self.pick_hosts(aliases)?;
                let command = self.ask_command(command)?;
                self.handle_at(&aliases, &command).await?
            }
            Commands::Transfer(args) => self.handle_transfer(args).await?,
            Commands::Encrypt { password_stdin } => self.handle_encrypt(password_stdin)?,
            Commands::Backup => self.handle_backup()?,
            Commands::Restore { archive } => self.handle_restore(&archive)?,
            Commands::Completions => self.handle_completions(),
        }

        Ok(())
    }

    /// First-run encryption offer, then the keychain password if one is set
    fn prepare_keychain(&mut self) -> anyhow::Result<()> {
        if !self.interactive {
            return Ok(());
        }

        let store = self.ctx.credentials_mut();
        if !store.is_bootstrapped() && !store.is_encrypted() {
            let protect = Confirm::new()
                .with_prompt("A new keychain was created. Protect it with a password?")
                .default(false)
                .interact()?;
            if protect {
                let password = ask_new_password()?;
                store.encrypt_database(&password)?;
                println!("{} Keychain encrypted", style("✓").green().bold());
            }
            return Ok(());
        }

        if store.is_encrypted() {
            let password = Zeroizing::new(
                Password::new()
                    .with_prompt("Keychain password")
                    .interact()?,
            );
            store.supply_password(&password)?;
        }

        Ok(())
    }

    /// The given alias, or one picked from the registry on a terminal
    fn pick_host(&mut self, alias: Option<String>) -> anyhow::Result<String> {
        if let Some(alias) = alias {
            return Ok(alias);
        }
        if !self.interactive {
            anyhow::bail!("alias is required in non-interactive mode");
        }

        let aliases = self.known_aliases()?;
        let choice = Select::new()
            .with_prompt("Host")
            .items(&aliases)
            .default(0)
            .interact()?;
        Ok(aliases[choice].clone())
    }

    fn pick_hosts(&mut self, aliases: Vec<String>) -> anyhow::Result<Vec<String>> {
        if !aliases.is_empty() {
            return Ok(aliases);
        }
        if !self.interactive {
            anyhow::bail!("at least one alias is required in non-interactive mode");
        }

        let known = self.known_aliases()?;
        let chosen = MultiSelect::new()
            .with_prompt("Hosts (space to select)")
            .items(&known)
            .interact()?;
        if chosen.is_empty() {
            anyhow::bail!("no host selected");
        }
        Ok(chosen.into_iter().map(|idx| known[idx].clone()).collect())
    }

    fn ask_command(&self, command: Vec<String>) -> anyhow::Result<String> {
        if !command.is_empty() {
            return Ok(command.join(" "));
        }
        if !self.interactive {
            anyhow::bail!("a command is required after `--` in non-interactive mode");
        }

        let command = Input::<String>::new().with_prompt("Command").interact_text()?;
        match non_empty(command) {
            Some(command) => Ok(command),
            None => anyhow::bail!("the command must not be empty"),
        }
    }

    fn known_aliases(&mut self) -> anyhow::Result<Vec<String>> {
        let aliases = self.ctx.host_service().aliases();
        if aliases.is_empty() {
            anyhow::bail!("no hosts found, use 'add' to create one");
        }
        Ok(aliases)
    }

    /// Handle the 'add' command
    fn handle_add(&mut self, args: AddArgs) -> anyhow::Result<()> {
        let interactive = self.interactive && !args.non_interactive;

        let alias = match args.alias {
            Some(alias) => alias,
            None if interactive => Input::<String>::new().with_prompt("Alias").interact_text()?,
            None => anyhow::bail!("alias is required in non-interactive mode"),
        };

        let existing = self.ctx.hosts().get(&alias).cloned();
        let is_new = existing.is_none();
        let mut host = existing.unwrap_or_else(|| Host::new(alias.clone(), ""));

        host.hostname = match args.hostname {
            Some(hostname) => hostname,
            None if interactive => Input::<String>::new()
                .with_prompt("Hostname or IP address")
                .with_initial_text(host.hostname.clone())
                .interact_text()?,
            None if is_new => anyhow::bail!("hostname is required in non-interactive mode"),
            None => host.hostname,
        };

        host.port = match args.port {
            Some(port) if port.trim().is_empty() => DEFAULT_PORT.to_string(),
            Some(port) => port,
            None if interactive => Input::<String>::new()
                .with_prompt("Port")
                .default(host.port.clone())
                .interact_text()?,
            None => host.port,
        };

        host.user = match args.user {
            Some(user) => non_empty(user),
            None if interactive => non_empty(
                Input::<String>::new()
                    .with_prompt("User (empty for the local user)")
                    .with_initial_text(host.user.clone().unwrap_or_default())
                    .allow_empty(true)
                    .interact_text()?,
            ),
            None => host.user,
        };

        let private_key = match &args.key_file_content_from {
            Some(path) => Some(Zeroizing::new(
                fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?,
            )),
            None => None,
        };

        host.identity_file = match args.identity_file {
            Some(path) => non_empty(path.to_string_lossy().into_owned()).map(PathBuf::from),
            None if interactive && private_key.is_none() => self.ask_identity_file(host.identity_file.take())?,
            None => host.identity_file,
        };

        host.jump_host = match args.jump_host {
            Some(jump) => non_empty(jump),
            None if interactive => non_empty(
                Input::<String>::new()
                    .with_prompt("Jump host alias (empty for none)")
                    .with_initial_text(host.jump_host.clone().unwrap_or_default())
                    .allow_empty(true)
                    .interact_text()?,
            ),
            None => host.jump_host,
        };

        for raw in &args.options {
            let (key, value) = parse_option(raw)
                .ok_or_else(|| anyhow::anyhow!("option {:?} is not KEY=VALUE", raw))?;
            host.options.insert(key, value);
        }

        let password = if args.password_stdin {
            Some(read_stdin_line()?)
        } else if interactive {
            let password = Zeroizing::new(
                Password::new()
                    .with_prompt("Password (empty to keep or skip)")
                    .allow_empty_password(true)
                    .interact()?,
            );
            if password.is_empty() {
                None
            } else {
                Some(password)
            }
        } else {
            None
        };

        let record = if password.is_some() || private_key.is_some() {
            let current = match self.ctx.credentials().get(&alias) {
                Ok(record) => record,
                Err(SshbookError::NotFound(_)) => Record::default(),
                Err(e) => return Err(e.into()),
            };
            Some(Record::new(
                password.as_deref().map_or(current.password.as_str(), |p| p.as_str()),
                private_key.as_deref().map_or(current.private_key.as_str(), |k| k.as_str()),
            ))
        } else {
            None
        };

        self.ctx.host_service().save_host(host, record)?;

        let verb = if is_new { "added" } else { "updated" };
        println!("{} Host '{}' {} successfully", style("✓").green().bold(), style(&alias).green(), verb);
        Ok(())
    }

    fn ask_identity_file(&mut self, current: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
        let known = self.ctx.host_service().known_keys();

        if known.is_empty() {
            let path = Input::<String>::new()
                .with_prompt("Identity file (empty for none)")
                .with_initial_text(current.map(|p| p.display().to_string()).unwrap_or_default())
                .allow_empty(true)
                .interact_text()?;
            return Ok(non_empty(path).map(PathBuf::from));
        }

        let mut items = vec!["(none)".to_string()];
        items.extend(known);
        items.push("(other path)".to_string());

        let current_idx = current
            .as_ref()
            .and_then(|p| items.iter().position(|item| Path::new(item) == p.as_path()))
            .unwrap_or(0);

        let choice = Select::new()
            .with_prompt("Identity file")
            .items(&items)
            .default(current_idx)
            .interact()?;

        Ok(match choice {
            0 => None,
            idx if idx == items.len() - 1 => {
                let path = Input::<String>::new()
                    .with_prompt("Identity file path")
                    .interact_text()?;
                non_empty(path).map(PathBuf::from)
            }
            idx => Some(PathBuf::from(&items[idx])),
        })
    }

    /// Handle the 'remove' command
    fn handle_remove(&mut self, alias: &str, yes: bool) -> anyhow::Result<()> {
        if self.interactive && !yes {
            let confirm = Confirm::new()
                .with_prompt(format!("Are you sure you want to remove host '{}'?", alias))
                .default(false)
                .interact()?;

            if !confirm {
                println!("{} Operation cancelled", style("!").yellow().bold());
                return Ok(());
            }
        }

        self.ctx.host_service().remove_host(alias)?;
        println!("{} Host '{}' removed successfully", style("✓").green().bold(), alias);
        Ok(())
    }

    /// Handle the 'list' command
    fn handle_list(&mut self) {
        let hosts = self.ctx.host_service().list();

        if hosts.is_empty() {
            println!("{} No hosts found. Use 'add' command to create one.", style("!").yellow().bold());
            return;
        }

        println!(
            "{:<15} {:<25} {:<12} {:<6} {}",
            style("ALIAS").cyan().bold(),
            style("HOSTNAME").cyan().bold(),
            style("USER").cyan().bold(),
            style("PORT").cyan().bold(),
            style("JUMP").cyan().bold()
        );

        for host in hosts {
            println!(
                "{:<15} {:<25} {:<12} {:<6} {}",
                style(&host.alias).green(),
                host.effective_hostname(),
                host.user.as_deref().unwrap_or("-"),
                host.port,
                host.jump_host.as_deref().unwrap_or("-")
            );
        }
    }

    /// Handle the 'show' command
    fn handle_show(&mut self, alias: &str) -> anyhow::Result<()> {
        let HostDetails { host, record } = self.ctx.host_service().show(alias)?;

        println!("{}", style(&host.alias).green().bold());
        println!("  {:<14} {}", "HostName", host.effective_hostname());
        println!("  {:<14} {}", "Port", host.port);
        println!("  {:<14} {}", "User", host.user.as_deref().unwrap_or("(local user)"));
        if let Some(path) = &host.identity_file {
            println!("  {:<14} {}", "IdentityFile", path.display());
        }
        if let Some(jump) = &host.jump_host {
            println!("  {:<14} {}", "ProxyJump", jump);
        }
        for (key, value) in host.options.iter() {
            println!("  {:<14} {}", key, value);
        }

        let (password, key) = match &record {
            Some(record) => (stored(record.has_password()), stored(record.has_private_key())),
            None => ("locked", "locked"),
        };
        println!("  {:<14} {}", "Password", password);
        println!("  {:<14} {}", "Private key", key);

        Ok(())
    }

    /// Handle the 'to' command
    async fn handle_to(&self, alias: &str) -> anyhow::Result<()> {
        println!("{} Connecting to {}...", style("→").green().bold(), style(alias).green());
        self.ctx.connections().connect(alias, self.verbose).await?;
        Ok(())
    }

    /// Handle the 'at' command
    async fn handle_at(&self, aliases: &[String], command: &str) -> anyhow::Result<()> {
        let outcomes = self
            .ctx
            .connections()
            .run_on_many(aliases, command, self.verbose)
            .await;

        let mut failed = 0;
        for outcome in &outcomes {
            println!("{}:", style(&outcome.alias).yellow());
            if let Some(output) = outcome.output() {
                print!("{}", output.stdout);
                if !output.stdout.is_empty() && !output.stdout.ends_with('\n') {
                    println!();
                }
                eprint!("{}", output.stderr);
            }
            if let Some(error) = outcome.error() {
                failed += 1;
                eprintln!("{} {}: {}", style("✗").red().bold(), outcome.alias, error);
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} hosts failed", failed, outcomes.len());
        }
        Ok(())
    }

    /// Handle the 'transfer' command
    async fn handle_transfer(&self, args: TransferArgs) -> anyhow::Result<()> {
        let direction = args.direction();
        let (verb, preposition) = match direction {
            Direction::Upload => ("Uploading", "to"),
            Direction::Download => ("Downloading", "from"),
        };
        println!(
            "{} {} {} {} {}",
            style("→").cyan().bold(),
            verb,
            args.source,
            preposition,
            style(&args.alias).green()
        );

        self.ctx
            .connections()
            .transfer(&args.alias, direction, &args.source, &args.destination)
            .await?;

        println!("{} Transfer complete", style("✓").green().bold());
        Ok(())
    }

    /// Handle the 'encrypt' command
    fn handle_encrypt(&mut self, password_stdin: bool) -> anyhow::Result<()> {
        if self.ctx.credentials().is_encrypted() {
            return Err(SshbookError::AlreadyEncrypted.into());
        }

        let password = if password_stdin {
            read_stdin_line()?
        } else if self.interactive {
            ask_new_password()?
        } else {
            anyhow::bail!("a password is required: pass it with --password-stdin");
        };

        if password.is_empty() {
            anyhow::bail!("the keychain password must not be empty");
        }

        self.ctx.credentials_mut().encrypt_database(&password)?;
        println!("{} Keychain encrypted", style("✓").green().bold());
        Ok(())
    }

    /// Handle the 'backup' command
    fn handle_backup(&self) -> anyhow::Result<()> {
        let path = self.ctx.backups().backup()?;
        println!("{} Backup written to {}", style("✓").green().bold(), path.display());
        Ok(())
    }

    /// Handle the 'restore' command
    fn handle_restore(&self, archive: &Path) -> anyhow::Result<()> {
        let report = self.ctx.backups().restore(archive)?;

        for moved in &report.moved_aside {
            println!("{} Previous file kept as {}", style("!").yellow().bold(), moved.display());
        }
        for path in &report.restored {
            println!("{} Restored {}", style("✓").green().bold(), path.display());
        }
        Ok(())
    }

    fn handle_completions(&mut self) {
        for alias in self.ctx.host_service().aliases() {
            println!("{}", alias);
        }
    }
}

fn uses_keychain(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Add(_)
            | Commands::Remove { .. }
            | Commands::Show { .. }
            | Commands::To { .. }
            | Commands::At { .. }
            | Commands::Transfer(_)
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn stored(present: bool) -> &'static str {
    if present {
        "stored"
    } else {
        "none"
    }
}

fn ask_new_password() -> anyhow::Result<Zeroizing<String>> {
    let password = Password::new()
        .with_prompt("Keychain password")
        .with_confirmation("Repeat password", "Passwords do not match")
        .interact()?;
    Ok(Zeroizing::new(password))
}

/// First line of stdin without its line ending
fn read_stdin_line() -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    io::stdin().read_line(&mut line)?;
    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(line)
}
