//! Syntactic validation of normalized query parameters.
//!
//! Validation never touches the network: a parameter set either satisfies
//! the structural constraints or is rejected with an operator-facing reason.

use serde::Deserialize;

/// Closed set of accepted identity-document types.
pub const VALID_DOCUMENT_TYPES: [&str; 7] = ["CC", "CE", "NIT", "PP", "TI", "RC", "CD"];

/// Plate length/format policy, selectable per deployment.
///
/// Two bounds exist historically: the dedicated plate endpoint accepted
/// 3-10 characters of any content, while the unified endpoint required 6-7
/// alphanumeric characters. Which bound is authoritative is a product
/// decision, so both ship as named policies behind the `PLATE_POLICY`
/// environment variable instead of one silently replacing the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatePolicy {
    Strict,
    Lenient,
}

impl PlatePolicy {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(PlatePolicy::Strict),
            "lenient" => Some(PlatePolicy::Lenient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatePolicy::Strict => "strict",
            PlatePolicy::Lenient => "lenient",
        }
    }

    /// Checks a normalized plate against this policy.
    pub fn validate(&self, placa: &str) -> Result<(), String> {
        let placa = placa.trim();
        if placa.is_empty() {
            return Err("La placa es requerida".to_string());
        }

        match self {
            PlatePolicy::Strict => {
                if placa.len() < 6 || placa.len() > 7 {
                    return Err("La placa debe tener entre 6 y 7 caracteres".to_string());
                }
                if !placa
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                {
                    return Err("La placa debe contener solo letras y números".to_string());
                }
            }
            PlatePolicy::Lenient => {
                if placa.len() < 3 {
                    return Err("La placa debe tener al menos 3 caracteres".to_string());
                }
                if placa.len() > 10 {
                    return Err("La placa no puede tener más de 10 caracteres".to_string());
                }
            }
        }

        Ok(())
    }
}

/// Checks a document type/number pair.
///
/// The type must belong to [`VALID_DOCUMENT_TYPES`] and the number must be
/// 3-20 characters once trimmed.
pub fn validate_documento(tipo_documento: &str, numero_documento: &str) -> Result<(), String> {
    let tipo = tipo_documento.trim().to_uppercase();
    let numero = numero_documento.trim();

    if tipo.is_empty() {
        return Err("El tipo de documento es requerido".to_string());
    }
    if numero.is_empty() {
        return Err("El número de documento es requerido".to_string());
    }

    if !VALID_DOCUMENT_TYPES.contains(&tipo.as_str()) {
        return Err(format!(
            "Tipo de documento no válido. Tipos válidos: {}",
            VALID_DOCUMENT_TYPES.join(", ")
        ));
    }

    if numero.len() < 3 {
        return Err("El número de documento debe tener al menos 3 caracteres".to_string());
    }
    if numero.len() > 20 {
        return Err("El número de documento no puede tener más de 20 caracteres".to_string());
    }

    Ok(())
}
