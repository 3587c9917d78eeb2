//! Keyword-based categorization
//!
//! Maps a free-text concept to a category by scanning a keyword table in
//! category priority order. The first category with a matching keyword wins;
//! concepts with no match fall back to `Other`.

use crate::models::{Category, VatType};

/// Keywords per category, in priority order
const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Equipment,
        &[
            "pesa",
            "mancuerna",
            "equipo",
            "maquina",
            "aparato",
            "material de entrenamiento",
            "bicicleta",
            "cinta",
        ],
    ),
    (
        Category::Certifications,
        &["certificacion", "certificado", "licencia", "acreditacion", "nasm", "ace", "nsca"],
    ),
    (
        Category::Marketing,
        &[
            "publicidad",
            "ads",
            "instagram",
            "facebook",
            "marketing",
            "promocion",
            "redes sociales",
            "fotografia",
        ],
    ),
    (
        Category::Transport,
        &[
            "combustible",
            "gasolina",
            "diesel",
            "peaje",
            "parking",
            "estacionamiento",
            "mantenimiento vehiculo",
            "taxi",
            "uber",
        ],
    ),
    (
        Category::Supplies,
        &["material", "suplemento", "toalla", "consumible", "proteina", "creatina"],
    ),
    (
        Category::Software,
        &["software", "suscripcion", "app", "aplicacion", "plataforma", "sistema", "saas", "cloud"],
    ),
    (
        Category::Insurance,
        &["seguro", "poliza", "responsabilidad civil", "aseguradora"],
    ),
    (
        Category::Rent,
        &["alquiler", "renta", "arriendo", "sala", "espacio", "oficina", "local"],
    ),
    (
        Category::ProfessionalServices,
        &[
            "contabilidad",
            "asesoria",
            "legal",
            "abogado",
            "consultoria",
            "diseño grafico",
            "diseñador",
        ],
    ),
    (
        Category::Training,
        &[
            "curso",
            "formacion",
            "workshop",
            "seminario",
            "capacitacion",
            "entrenamiento personal",
            "nutricion",
        ],
    ),
    (
        Category::Communications,
        &["telefono", "internet", "wifi", "movil", "comunicacion", "linea telefonica"],
    ),
    (
        Category::Meals,
        &["comida", "almuerzo", "cena", "restaurante", "dieta", "alimentacion trabajo"],
    ),
    (
        Category::Clothing,
        &["ropa", "uniforme", "calzado", "zapatillas", "camiseta", "pantalon trabajo"],
    ),
];

/// Suggest a category for an expense concept
pub fn categorize(concept: &str) -> Category {
    let concept_lower = concept.to_lowercase();

    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| concept_lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

/// VAT treatment implied by a category and concept
pub fn vat_type_for(category: Category, concept: &str) -> VatType {
    let concept_lower = concept.to_lowercase();

    match category {
        Category::Training
            if concept_lower.contains("curso") || concept_lower.contains("formacion") =>
        {
            VatType::Exempt
        }
        Category::Insurance => VatType::Exempt,
        _ => VatType::General,
    }
}
