use crate::error::EngineError;
use crate::types::{Score, DEFAULT_HASH_MB};

/// Feature gates and tuning knobs for the search. Every pruning, reduction
/// and ordering feature can be switched off individually, which keeps the
/// plain alpha-beta core testable against its optimized self.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub use_alphabeta: bool,
    pub use_pvs: bool,
    pub use_pvs_ordering: bool,
    pub use_killers: bool,
    pub use_aspiration: bool,
    pub aspiration_start_depth: i32,
    pub use_mtdf: bool,
    pub mtdf_start_depth: i32,
    pub use_tt: bool,
    pub use_tt_root: bool,
    pub use_mdp: bool,
    pub use_mpp: bool,
    pub use_rfp: bool,
    pub rfp_margin: Score,
    pub use_nmp: bool,
    pub nmp_depth: i32,
    pub verify_nmp: bool,
    pub nmp_verification_depth: i32,
    pub use_razoring: bool,
    pub razor_depth: i32,
    pub razor_margin: Score,
    pub use_iid: bool,
    pub iid_reduction: i32,
    pub use_extensions: bool,
    pub use_limited_razoring: bool,
    pub use_extended_futility: bool,
    pub use_futility: bool,
    pub use_lmr: bool,
    pub lmr_min_depth: i32,
    pub lmr_min_moves: usize,
    pub lmr_reduction: i32,
    pub use_quiescence: bool,
    pub use_qfutility: bool,
    pub use_book: bool,
    pub hash_size_mb: usize,
    pub perft: bool,
    /// Score handed out for repetition draws inside the tree, negated for the
    /// side to move. Positive values make the engine avoid draws.
    pub contempt_factor: Score,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            use_alphabeta: true,
            use_pvs: true,
            use_pvs_ordering: true,
            use_killers: true,
            use_aspiration: true,
            aspiration_start_depth: 3,
            // MTD(f) replaces the whole window strategy and cannot coexist
            // with PVS, so it defaults off.
            use_mtdf: false,
            mtdf_start_depth: 2,
            use_tt: true,
            use_tt_root: true,
            use_mdp: true,
            use_mpp: true,
            use_rfp: true,
            rfp_margin: 300,
            use_nmp: true,
            nmp_depth: 3,
            verify_nmp: true,
            nmp_verification_depth: 3,
            use_razoring: true,
            razor_depth: 3,
            razor_margin: 600,
            use_iid: true,
            iid_reduction: 2,
            use_extensions: true,
            use_limited_razoring: true,
            use_extended_futility: true,
            use_futility: true,
            use_lmr: true,
            lmr_min_depth: 3,
            lmr_min_moves: 3,
            lmr_reduction: 1,
            use_quiescence: true,
            use_qfutility: true,
            use_book: true,
            hash_size_mb: DEFAULT_HASH_MB,
            perft: false,
            contempt_factor: 20,
        }
    }
}

impl SearchOptions {
    /// A configuration with every search feature switched off: plain
    /// minimax plus evaluation. Used by perft validation and tests.
    pub fn all_off() -> Self {
        Self {
            use_alphabeta: false,
            use_pvs: false,
            use_pvs_ordering: false,
            use_killers: false,
            use_aspiration: false,
            use_mtdf: false,
            use_tt: false,
            use_tt_root: false,
            use_mdp: false,
            use_mpp: false,
            use_rfp: false,
            use_nmp: false,
            verify_nmp: false,
            use_razoring: false,
            use_iid: false,
            use_extensions: false,
            use_limited_razoring: false,
            use_extended_futility: false,
            use_futility: false,
            use_lmr: false,
            use_quiescence: false,
            use_qfutility: false,
            use_book: false,
            ..Self::default()
        }
    }

    /// Set a recognized option by name. Names are matched case-insensitively;
    /// booleans accept `true`/`false`/`on`/`off`/`1`/`0`. A rejected value
    /// leaves the configuration untouched.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        let mut next = self.clone();
        next.apply(name, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        let key = name.to_ascii_uppercase();
        match key.as_str() {
            "USE_ALPHABETA_PRUNING" => self.use_alphabeta = parse_bool(&key, value)?,
            "USE_PVS" => self.use_pvs = parse_bool(&key, value)?,
            "USE_PVS_ORDERING" => self.use_pvs_ordering = parse_bool(&key, value)?,
            "USE_KILLER_MOVES" => self.use_killers = parse_bool(&key, value)?,
            "NO_KILLER_MOVES" => self.use_killers = !parse_bool(&key, value)?,
            "USE_ASPIRATION_WINDOW" => self.use_aspiration = parse_bool(&key, value)?,
            "ASPIRATION_START_DEPTH" => self.aspiration_start_depth = parse_num(&key, value)?,
            "USE_MTDF" => self.use_mtdf = parse_bool(&key, value)?,
            "MTDF_START_DEPTH" => self.mtdf_start_depth = parse_num(&key, value)?,
            "USE_TRANSPOSITION_TABLE" => self.use_tt = parse_bool(&key, value)?,
            "USE_TT_ROOT" => self.use_tt_root = parse_bool(&key, value)?,
            "USE_MDP" => self.use_mdp = parse_bool(&key, value)?,
            "USE_MPP" => self.use_mpp = parse_bool(&key, value)?,
            "USE_RFP" => self.use_rfp = parse_bool(&key, value)?,
            "RFP_MARGIN" => self.rfp_margin = parse_num(&key, value)?,
            "USE_NMP" => self.use_nmp = parse_bool(&key, value)?,
            "NMP_DEPTH" => self.nmp_depth = parse_num(&key, value)?,
            "USE_VERIFY_NMP" => self.verify_nmp = parse_bool(&key, value)?,
            "NMP_VERIFICATION_DEPTH" => self.nmp_verification_depth = parse_num(&key, value)?,
            "USE_RAZOR_PRUNING" => self.use_razoring = parse_bool(&key, value)?,
            "RAZOR_DEPTH" => self.razor_depth = parse_num(&key, value)?,
            "RAZOR_MARGIN" => self.razor_margin = parse_num(&key, value)?,
            "USE_IID" => self.use_iid = parse_bool(&key, value)?,
            "IID_REDUCTION" => self.iid_reduction = parse_num(&key, value)?,
            "USE_EXTENSIONS" => self.use_extensions = parse_bool(&key, value)?,
            "USE_LIMITED_RAZORING" => self.use_limited_razoring = parse_bool(&key, value)?,
            "USE_EXTENDED_FUTILITY_PRUNING" => {
                self.use_extended_futility = parse_bool(&key, value)?
            }
            "USE_FUTILITY_PRUNING" => self.use_futility = parse_bool(&key, value)?,
            "USE_LMR" => self.use_lmr = parse_bool(&key, value)?,
            "LMR_MIN_DEPTH" => self.lmr_min_depth = parse_num(&key, value)?,
            "LMR_MIN_MOVES" => self.lmr_min_moves = parse_num::<usize>(&key, value)?,
            "LMR_REDUCTION" => self.lmr_reduction = parse_num(&key, value)?,
            "USE_QUIESCENCE" => self.use_quiescence = parse_bool(&key, value)?,
            "USE_QFUTILITY_PRUNING" => self.use_qfutility = parse_bool(&key, value)?,
            "USE_BOOK" => self.use_book = parse_bool(&key, value)?,
            "HASH_SIZE" | "HASH" => {
                let mb = parse_num::<usize>(&key, value)?;
                if mb < 1 {
                    return Err(EngineError::Config(format!(
                        "hash size must be at least 1 MB, got {mb}"
                    )));
                }
                self.hash_size_mb = mb;
            }
            "PERFT" => self.perft = parse_bool(&key, value)?,
            "CONTEMPT_FACTOR" => self.contempt_factor = parse_num(&key, value)?,
            _ => {
                return Err(EngineError::Config(format!("unknown option '{name}'")));
            }
        }
        Ok(())
    }

    /// Reject contradictory combinations before they reach a search.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.hash_size_mb < 1 {
            return Err(EngineError::Config(format!(
                "hash size must be at least 1 MB, got {}",
                self.hash_size_mb
            )));
        }
        if self.use_mtdf && self.use_pvs {
            return Err(EngineError::Config(
                "MTD(f) and PVS cannot be enabled together".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, EngineError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(EngineError::Config(format!(
            "option {key} expects a boolean, got '{value}'"
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, EngineError> {
    value.parse().map_err(|_| {
        EngineError::Config(format!("option {key} expects a number, got '{value}'"))
    })
}
