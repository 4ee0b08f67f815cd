use clap::Parser;

use crate::core::Tool;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Your message for the coach
    #[arg()]
    pub query: Vec<String>,

    /// Tool to talk to (chat or interview)
    #[arg(short, long, value_enum)]
    pub tool: Option<Tool>,

    /// Keep reading messages from stdin after the first reply
    #[arg(short, long, default_value = "false")]
    pub interactive: bool,

    /// Enable debug output
    #[arg(short, long, default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// The positional words joined back into one message.
    pub fn query(&self) -> Option<String> {
        let query = self.query.join(" ");
        let query = query.trim();
        (!query.is_empty()).then(|| query.to_string())
    }
}
