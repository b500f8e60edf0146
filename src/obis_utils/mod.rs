use std::collections::HashMap;

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    let descriptions = get_p1_obis_descriptions();
    descriptions.get(obis_code).copied()
}

pub fn get_p1_obis_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    // Header information
    map.insert("1-3:0.2.8", "P1 protocol version");
    map.insert("0-0:1.0.0", "Date and time of telegram");
    map.insert("0-0:96.1.1", "Equipment identifier");
    map.insert("0-0:96.14.0", "Tariff indicator");

    // Energy registers
    map.insert("1-0:1.8.1", "Electricity delivered to client (tariff 1)");
    map.insert("1-0:1.8.2", "Electricity delivered to client (tariff 2)");
    map.insert("1-0:2.8.1", "Electricity delivered by client (tariff 1)");
    map.insert("1-0:2.8.2", "Electricity delivered by client (tariff 2)");

    // Actual power
    map.insert("1-0:1.7.0", "Actual electricity power delivered (+P)");
    map.insert("1-0:2.7.0", "Actual electricity power received (-P)");
    map.insert("1-0:21.7.0", "Instantaneous active power L1 (+P)");
    map.insert("1-0:41.7.0", "Instantaneous active power L2 (+P)");
    map.insert("1-0:61.7.0", "Instantaneous active power L3 (+P)");
    map.insert("1-0:22.7.0", "Instantaneous active power L1 (-P)");
    map.insert("1-0:42.7.0", "Instantaneous active power L2 (-P)");
    map.insert("1-0:62.7.0", "Instantaneous active power L3 (-P)");

    // Voltage and current
    map.insert("1-0:32.7.0", "Instantaneous voltage L1");
    map.insert("1-0:52.7.0", "Instantaneous voltage L2");
    map.insert("1-0:72.7.0", "Instantaneous voltage L3");
    map.insert("1-0:31.7.0", "Instantaneous current L1");
    map.insert("1-0:51.7.0", "Instantaneous current L2");
    map.insert("1-0:71.7.0", "Instantaneous current L3");

    // Power quality
    map.insert("0-0:96.7.21", "Number of power failures in any phase");
    map.insert("0-0:96.7.9", "Number of long power failures in any phase");
    map.insert("1-0:99.97.0", "Power failure event log");
    map.insert("1-0:32.32.0", "Number of voltage sags L1");
    map.insert("1-0:52.32.0", "Number of voltage sags L2");
    map.insert("1-0:72.32.0", "Number of voltage sags L3");
    map.insert("1-0:32.36.0", "Number of voltage swells L1");
    map.insert("1-0:52.36.0", "Number of voltage swells L2");
    map.insert("1-0:72.36.0", "Number of voltage swells L3");
    map.insert("0-0:96.13.0", "Text message");

    // Gas on the first M-Bus channel
    map.insert("0-1:24.1.0", "M-Bus device type");
    map.insert("0-1:96.1.0", "Gas meter equipment identifier");
    map.insert("0-1:24.2.1", "Last 5-minute gas meter reading");

    map
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E*F
    // A: Medium (0=abstract, 1=electricity, 6=heat, 7=gas, 8=water)
    // B: Channel (0-15)
    // C: Physical value (1-255)
    // D: Processing method (0-255)
    // E: Tariff/Time (0-255)
    // F: Storage (optional, 0-255)

    let Some((ab_part, cde_part)) = code.split_once(':') else {
        return false;
    };

    let ab_parts: Vec<&str> = ab_part.split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    let cde_part = cde_part.split('*').next().unwrap_or("");
    let cde_parts: Vec<&str> = cde_part.split('.').collect();
    if cde_parts.len() != 3 {
        return false;
    }

    ab_parts.iter().chain(cde_parts.iter()).all(|part| part.parse::<u8>().is_ok())
}

pub fn normalize_obis_code(code: &str) -> String {
    code.trim().to_string()
}
