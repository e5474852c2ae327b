/// Extract the device's own name from `show running-config | include ^hostname`.
///
/// Accepts `hostname <name>` (IOS) and `switchname <name>` (NX-OS). Returns the first
/// match; everything else in the output is ignored.
pub fn parse_hostname(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        match tokens.next()? {
            "hostname" | "switchname" => tokens.next().map(|name| name.trim_matches('"').to_string()),
            _ => None,
        }
    })
}
