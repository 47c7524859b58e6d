//! User-facing message texts. Nothing here ever carries error detail.

use rust_decimal::Decimal;

pub const WELCOME: &str = "Hey there! I'm your yield sprout 🌱\n\n\
I grow your savings and pay you for looking after me.\n\n\
To get started:\n\
1. Grab the access key you were given\n\
2. Send me /hi YOUR-ACCESS-KEY\n\n\
Like this: /hi XY-8765";

pub const INVALID_ACCESS_KEY: &str = "Hmm, that access key doesn't look right 😅\n\n\
Send it like this:\n/hi AB-1234";

pub const ERROR: &str = "Something went wrong on my side 😅\nPlease try again in a bit!";

pub const DEACTIVATED: &str = "*wilts* 🥀\n\n\
I haven't heard from you in a while, so I'm going to sleep now. \
Ask an administrator to wake me up again.";

pub const REQUEST_EXPIRED: &str = "Sorry, that request has expired. A fresh one is on its way soon 🌿";

pub const ALREADY_RESPONDED: &str =
    "That request was already answered or is no longer valid 🌿";

pub const NO_PROFIT: &str =
    "You don't have any committed profit to withdraw yet. Keep replying to my reminders to earn some 💧";

pub const WITHDRAW_ERROR: &str = "The withdrawal didn't go through. Please try again later!";

pub const INVALID_ADDRESS: &str =
    "That doesn't look like a valid Ethereum address. Please check it and try again.";

pub const MISSING_ADDRESS: &str = "Please tell me where to send the funds:\n\
/withdraw 0xYourEthereumAddress";

pub fn setup_complete(username: &str) -> String {
    format!(
        "Hey {}! 👋\n\nYour wallet is all set up.\n\
I'll send you reminders from now on; reply to each one to lock in your yield.\n\n\
Let's grow together! 🌿",
        username
    )
}

pub fn reminder(username: &str, available: &str) -> String {
    format!(
        "Hey {}!\n\nI've grown a little and saved up {} USDC for you.\n\n\
Reply \"Done\" to this message to claim it.\n\n🌱🌱🌱",
        username, available
    )
}

pub fn thanks(amount: Decimal, total: Decimal) -> String {
    format!(
        "Thank you! 🌿\n\nI've added {} USDC to your committed balance. \
You now have {} USDC ready to withdraw.",
        amount.normalize(),
        total.normalize()
    )
}

pub fn withdraw_success(amount: Decimal, address: &str, tx_url: &str) -> String {
    format!(
        "Sent {} USDC to {} 💰\n\nTransaction: {}",
        amount.normalize(),
        address,
        tx_url
    )
}

pub fn withdrawal_too_soon(interval_hours: i64) -> String {
    format!("You can only withdraw once every {} hours!", interval_hours)
}
