//! arcspi - interactive shell
//!
//! Runs every SQL line through a fresh executor against an in-process
//! reference host. Dot commands manage a session connection, a transaction
//! scope and named prepared plans.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use arcspi::{ColumnDesc, Datum, Host, HostConfig, HostScope, Plan, SpiExecutor};

const PROMPT: &str = "arcspi> ";

/// Print welcome banner
fn print_banner() {
    println!(
        r#"
 arcspi - arena-safe query shell
 Type '.help' for help, '.quit' to exit
"#
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help                 Show this help message
  .quit                 Exit
  .connect              Open the session connection
  .disconnect           Close the session connection
  .begin                Begin a transaction scope
  .end                  End the transaction scope
  .prepare <name> <sql> Compile a plan on the session connection
  .run <name>           Execute a prepared plan
  .keep <name>          Promote a plan so it survives its scope
  .drop <name>          Release a plan
  .plans                List prepared plans
  .arenas               Show the live arena tree

Anything else is run as SQL, e.g.
  SELECT i, i * i AS square FROM generate_series(1, 5) i;
"#
    );
}

/// Format query results as a table
fn format_results(columns: &[ColumnDesc], rows: &[Vec<Datum>]) -> String {
    if columns.is_empty() && rows.is_empty() {
        return String::new();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.name.len()).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.to_string().len());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c.name, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in rows {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }
    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", rows.len()));
    output
}

struct Shell {
    host: Host,
    session: Option<SpiExecutor>,
    transaction: Option<HostScope>,
    plans: IndexMap<String, Plan>,
}

impl Shell {
    fn new(host: Host) -> Self {
        Self {
            host,
            session: None,
            transaction: None,
            plans: IndexMap::new(),
        }
    }

    /// Run one SQL statement through a fresh executor
    fn execute_sql(&self, sql: &str) -> Result<()> {
        let spi = SpiExecutor::connect(&self.host)?;
        let results = spi.query::<Vec<Datum>, ()>(sql, ())?;
        let columns = results.columns().to_vec();
        let rows = results.into_vec()?;
        print!("{}", format_results(&columns, &rows));
        spi.close()?;
        Ok(())
    }

    fn run_plan(&self, name: &str) -> Result<()> {
        let plan = self.plan(name)?;
        let spi = SpiExecutor::connect(&self.host)?;
        let results = spi.query_plan::<Vec<Datum>, ()>(plan, ())?;
        let columns = results.columns().to_vec();
        let rows = results.into_vec()?;
        print!("{}", format_results(&columns, &rows));
        spi.close()?;
        Ok(())
    }

    fn plan(&self, name: &str) -> Result<&Plan> {
        self.plans
            .get(name)
            .with_context(|| format!("no plan named '{}'", name))
    }

    /// Handle a dot command; returns false when the shell should exit
    fn handle_command(&mut self, line: &str) -> Result<bool> {
        let mut parts = line.splitn(3, char::is_whitespace);
        let cmd = parts.next().unwrap_or_default();
        let name = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let rest = parts.next().map(str::trim).unwrap_or_default();

        match (cmd, name) {
            (".help", _) => print_help(),
            (".quit" | ".exit", _) => return Ok(false),
            (".connect", _) => {
                if self.session.is_some() {
                    bail!("session connection already open");
                }
                let spi = SpiExecutor::connect(&self.host)?;
                println!("connected ({})", spi.connection());
                self.session = Some(spi);
            }
            (".disconnect", _) => match self.session.take() {
                Some(spi) => {
                    spi.close()?;
                    println!("disconnected");
                }
                None => bail!("no session connection"),
            },
            (".begin", _) => {
                if self.transaction.is_some() {
                    bail!("transaction already in progress");
                }
                let scope = self.host.begin_transaction()?;
                println!("BEGIN ({})", scope.arena());
                self.transaction = Some(scope);
            }
            (".end", _) => match self.transaction.take() {
                Some(scope) => {
                    scope.end()?;
                    println!("END");
                }
                None => bail!("no transaction in progress"),
            },
            (".prepare", Some(name)) => {
                if rest.is_empty() {
                    bail!("usage: .prepare <name> <sql>");
                }
                let spi = self
                    .session
                    .as_ref()
                    .context("no session connection; use .connect first")?;
                let plan = spi.plan::<()>(rest)?;
                println!("prepared '{}' in {}", name, plan.origin());
                if let Some(old) = self.plans.insert(name.to_string(), plan) {
                    old.release()?;
                }
            }
            (".run", Some(name)) => self.run_plan(name)?,
            (".keep", Some(name)) => {
                let plan = self
                    .plans
                    .get_mut(name)
                    .with_context(|| format!("no plan named '{}'", name))?;
                plan.keep()?;
                println!("kept '{}'", name);
            }
            (".drop", Some(name)) => {
                let plan = self
                    .plans
                    .shift_remove(name)
                    .with_context(|| format!("no plan named '{}'", name))?;
                plan.release()?;
                println!("dropped '{}'", name);
            }
            (".plans", _) => {
                if self.plans.is_empty() {
                    println!("No plans.");
                }
                for (name, plan) in &self.plans {
                    let status = match (plan.is_valid(), plan.is_kept()) {
                        (false, _) => "stale",
                        (true, true) => "kept",
                        (true, false) => "transient",
                    };
                    println!("  {:<12} {:<10} {}", name, status, plan.sql());
                }
            }
            (".arenas", _) => print!("{}", self.host.dump_arenas()),
            (".prepare" | ".run" | ".keep" | ".drop", None) => {
                bail!("usage: {} <name>", cmd)
            }
            (other, _) => {
                bail!("unknown command: {} (type '.help' for available commands)", other)
            }
        }
        Ok(true)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => HostConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => HostConfig::default(),
    };

    let mut shell = Shell::new(Host::new(config));
    let mut editor = DefaultEditor::new()?;

    print_banner();

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);

                let outcome = if trimmed.starts_with('.') {
                    shell.handle_command(trimmed)
                } else {
                    shell.execute_sql(trimmed).map(|_| true)
                };
                match outcome {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("Goodbye!");
    Ok(())
}
