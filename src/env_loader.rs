use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(devlog_home: Option<PathBuf>, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(home) = devlog_home {
        return Some(home.join(".env"));
    }
    config_dir.map(|dir| dir.join("devlog/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("DEVLOG_HOME").map(PathBuf::from),
        dirs::config_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_devlog_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/site")),
            Some(PathBuf::from("/home/alice/.config")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/site/.env")));
    }

    #[test]
    fn fallback_uses_config_dir_when_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice/.config")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.config/devlog/.env")));
    }
}
