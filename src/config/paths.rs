//! Config file location

use std::path::PathBuf;

/// Names the config file explicitly
pub const CONFIG_PATH_ENV: &str = "MIRAI_BRIDGE_CONFIG";

/// Default config file: `$MIRAI_BRIDGE_CONFIG`, else
/// `<user config dir>/mirai-bridge/config.json`, else `mirai-bridge.json` in
/// the working directory
pub fn config_path() -> PathBuf {
    resolve(
        std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
        dirs::config_dir(),
    )
}

fn resolve(explicit: Option<PathBuf>, user_config_dir: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| match user_config_dir {
        Some(dir) => dir.join("mirai-bridge").join("config.json"),
        None => PathBuf::from("mirai-bridge.json"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_precedence() {
        let explicit = PathBuf::from("/etc/bridge.toml");
        let user_dir = PathBuf::from("/home/bot/.config");

        assert_eq!(resolve(Some(explicit.clone()), Some(user_dir.clone())), explicit);
        assert_eq!(
            resolve(None, Some(user_dir)),
            PathBuf::from("/home/bot/.config/mirai-bridge/config.json")
        );
        assert_eq!(resolve(None, None), PathBuf::from("mirai-bridge.json"));
    }
}
