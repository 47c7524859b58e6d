/// Finite command grammar of the bot, parsed once at the channel boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/hi <access-key>`
    Link { access_key: String },
    /// `/start` or `/help`
    Start,
    /// `/withdraw [address]`
    Withdraw { address: Option<String> },
}

impl Command {
    /// `None` for plain text and unknown commands.
    ///
    /// A `@botname` suffix on the command word is accepted (`/start@my_bot`).
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let argument = words.next().map(str::to_string);

        match name.as_str() {
            "hi" => argument.map(|access_key| Command::Link { access_key }),
            "start" | "help" => Some(Command::Start),
            "withdraw" => Some(Command::Withdraw { address: argument }),
            _ => None,
        }
    }
}
