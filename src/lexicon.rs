//! Component A: the closed, multilingual header-text-to-field lexicon.
//!
//! The lexicon is a compile-time constant, not a bag of regex heuristics: a
//! circuit's header row is read once per snapshot and the mapping it
//! produces is persisted, so a silent mis-alias here would follow a circuit
//! around forever. Misses are kept verbatim rather than discarded.

/// Canonical field names. These are the only names the lexicon itself
/// produces; a header term with no lexicon entry is retained as its own
/// literal text by the caller (see [`classify`]).
pub mod field {
    pub const POSITION: &str = "Position";
    pub const DRIVER: &str = "Driver";
    pub const KART: &str = "Kart";
    pub const LAST_LAP: &str = "LastLap";
    pub const BEST_LAP: &str = "BestLap";
    pub const GAP: &str = "Gap";
    pub const LAPS: &str = "Laps";
    pub const NATION: &str = "Nation";
    pub const STATUS: &str = "Status";
    pub const PRACTICE: &str = "Practice";
    pub const SESSION: &str = "Session";
    pub const TIME: &str = "Time";
    pub const TEAM: &str = "Team";
}

/// Look up a header cell's exact text in the lexicon.
///
/// Returns `Some(canonical)` on a hit. The empty string is a lexicon entry in
/// its own right, mapping to [`field::STATUS`]. Matching is case-sensitive:
/// the feed's header casing is consistent per-vendor, and the few terms that
/// collide case-insensitively across languages (e.g. Italian `Stato` vs. a
/// hypothetical abbreviation) would become ambiguous otherwise.
pub fn lookup(header: &str) -> Option<&'static str> {
    Some(match header {
        "" => field::STATUS,

        // Position
        "Pos" | "Pos." | "Position" | "Clt" | "Rang" | "Platz" | "Posizione" | "Posición"
        | "Positie" | "Classement" => field::POSITION,

        // Driver
        "Driver" | "Pilote" | "Nom" | "Name" | "Fahrer" | "Pilota" | "Piloto" | "Coureur"
        | "Concorrente" | "Naam" => field::DRIVER,

        // Kart
        "Kart" | "Kart#" | "Kart No" | "N°" | "No." | "Num" | "Numero" | "Número" | "Nr." => {
            field::KART
        }

        // LastLap
        "Last Lap" | "LastLap" | "Dernier T." | "Dernier Tour" | "Letzte Runde" | "Letzte"
        | "Ultimo Tempo" | "Último Tiempo" | "Laatste Ronde" | "Laatste" => field::LAST_LAP,

        // BestLap
        "Best Lap" | "BestLap" | "Meilleur T." | "Meilleur Tour" | "Beste Runde" | "Beste"
        | "Miglior Tempo" | "Mejor Tiempo" | "Beste Ronde" => field::BEST_LAP,

        // Gap
        "Gap" | "Ecart" | "Écart" | "Interval" | "Abstand" | "Distacco" | "Distancia"
        | "Achterstand" => field::GAP,

        // Laps
        "Laps" | "Tours" | "Runden" | "Giri" | "Vueltas" | "Ronden" => field::LAPS,

        // Nation
        "Nat." | "Nat" | "Nation" | "Nationalité" | "Nationalitaet" | "Nazionalità"
        | "Nacionalidad" | "Nationaliteit" => field::NATION,

        // Status
        "Status" | "Etat" | "État" | "Zustand" | "Stato" | "Estado" => field::STATUS,

        // Practice
        "Practice" | "Essai" | "Essais" | "Training" | "Prova" | "Entrenamiento"
        | "Training (Oefenen)" => field::PRACTICE,

        // Session
        "Session" | "Manche" | "Sesión" | "Sitzung" => field::SESSION,

        // Time
        "Time" | "Temps" | "Zeit" | "Tempo" | "Tiempo" | "Tijd" => field::TIME,

        // Team
        "Team" | "Equipe" | "Équipe" | "Mannschaft" | "Squadra" | "Equipo" => field::TEAM,

        _ => return None,
    })
}

/// Classify a header cell: lexicon hit if one exists, otherwise the text
/// kept verbatim as the field name. Logs unknown terms at `debug`.
pub fn classify(header: &str) -> String {
    match lookup(header) {
        Some(canonical) => canonical.to_string(),
        None => {
            tracing::debug!(term = header, "unknown header term");
            header.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_maps_to_status() {
        assert_eq!(lookup(""), Some(field::STATUS));
    }

    #[test]
    fn recognises_french_and_german_synonyms() {
        assert_eq!(lookup("Dernier T."), Some(field::LAST_LAP));
        assert_eq!(lookup("Runden"), Some(field::LAPS));
    }

    #[test]
    fn unknown_term_kept_verbatim() {
        assert_eq!(classify("Foo"), "Foo");
    }
}
