use colored::Colorize;

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

#[allow(dead_code)]
pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_does_not_panic() {
        error("This is an error");
    }

    #[test]
    fn test_warn_does_not_panic() {
        warn("This is a warning");
    }
}
