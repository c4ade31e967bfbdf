#[macro_use]
pub mod command_macros {
    /// Uses the flag value when given, otherwise asks on stdin.
    #[macro_export]
    macro_rules! arg_input {
        ($op:expr, $query:expr) => {{
            match $op.clone() {
                Some(value) => anyhow::Ok(value.to_string()),
                None => {
                    let mut arg = String::new();
                    println!($query);
                    std::io::stdin().read_line(&mut arg).map(|_| {
                        arg.trim_end_matches(&['\r', '\n'][..]).to_owned()
                    }).map_err(anyhow::Error::from)
                }
            }
        }};
    }
}
