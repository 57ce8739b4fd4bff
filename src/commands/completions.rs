use anyhow::Result;
use clap::{Args, CommandFactory, ValueEnum};
use clap_complete::{Generator, generate, shells};
use std::io::{self, Write};

use crate::Cli;

const BIN_NAME: &str = "email-manager";

#[derive(Args, Debug)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,

    /// Output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Posh, // PowerShell
    Elvish,
}

impl CompletionsCommand {
    pub fn execute(&self) -> Result<()> {
        if let Some(path) = &self.output {
            let mut file = std::fs::File::create(path)?;
            self.write_to(&mut file);
            eprintln!("Completions written to {}", path);
        } else {
            self.write_to(&mut io::stdout());
        }
        Ok(())
    }

    fn write_to(&self, out: &mut dyn Write) {
        match self.shell {
            Shell::Bash => render(shells::Bash, out),
            Shell::Zsh => render(shells::Zsh, out),
            Shell::Fish => render(shells::Fish, out),
            Shell::Posh => render(shells::PowerShell, out),
            Shell::Elvish => render(shells::Elvish, out),
        }
    }
}

fn render<G: Generator>(shell: G, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions_cover_subcommands() {
        let command = CompletionsCommand {
            shell: Shell::Bash,
            output: None,
        };
        let mut out = Vec::new();
        command.write_to(&mut out);

        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("download-attachments"));
        assert!(script.contains("labels"));
    }
}
