//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Raw numeric lookup that distinguishes "absent" from "malformed".
    fn get_f64(&self, section: &str, key: &str) -> Option<Result<f64, String>> {
        self.get_string(section, key).map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|e| format!("{raw:?} is not a number: {e}"))
        })
    }
}
