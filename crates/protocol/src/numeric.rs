//! Server numerics the session glue reacts to.

pub const RPL_WELCOME: &str = "001";
pub const RPL_WHOISACCOUNT: &str = "330";
pub const RPL_WHOREPLY: &str = "352";
pub const RPL_ENDOFWHO: &str = "315";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";

/// Symbolic name for a numeric, used in log output.
pub fn symbolic(code: &str) -> Option<&'static str> {
    Some(match code {
        RPL_WELCOME => "RPL_WELCOME",
        "002" => "RPL_YOURHOST",
        "003" => "RPL_CREATED",
        "004" => "RPL_MYINFO",
        "005" => "RPL_ISUPPORT",
        RPL_ENDOFWHO => "RPL_ENDOFWHO",
        RPL_WHOISACCOUNT => "RPL_WHOISACCOUNT",
        "332" => "RPL_TOPIC",
        RPL_WHOREPLY => "RPL_WHOREPLY",
        "353" => "RPL_NAMREPLY",
        "366" => "RPL_ENDOFNAMES",
        "372" => "RPL_MOTD",
        "375" => "RPL_MOTDSTART",
        "376" => "RPL_ENDOFMOTD",
        ERR_ERRONEUSNICKNAME => "ERR_ERRONEUSNICKNAME",
        ERR_NICKNAMEINUSE => "ERR_NICKNAMEINUSE",
        _ => return None,
    })
}
