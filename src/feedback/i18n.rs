use serde::{Deserialize, Serialize};

use crate::geometry::EdgeName;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    De,
    Fr,
    Es,
}

impl Default for Locale {
    fn default() -> Self {
        Locale::En
    }
}

impl Locale {
    pub const ALL: [Locale; 4] = [Locale::En, Locale::De, Locale::Fr, Locale::Es];

    /// Language code handed to the speech engine.
    pub fn language(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::De => "de",
            Locale::Fr => "fr",
            Locale::Es => "es",
        }
    }
}

/// Everything the assistant can say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    AssistantEnabled,
    GuidanceUnavailable,
    EdgesDetected,
    DocumentLost,
    EdgeNotVisible(EdgeName),
    HoldSteady,
    PhotoCaptured,
    Countdown(u32),
}

impl MessageKey {
    /// Stable identifier, e.g. `edge-not-visible:top`.
    pub fn id(&self) -> String {
        match self {
            MessageKey::AssistantEnabled => "assistant-enabled".into(),
            MessageKey::GuidanceUnavailable => "guidance-unavailable".into(),
            MessageKey::EdgesDetected => "edges-detected".into(),
            MessageKey::DocumentLost => "document-lost".into(),
            MessageKey::EdgeNotVisible(edge) => format!("edge-not-visible:{}", edge.as_str()),
            MessageKey::HoldSteady => "hold-steady".into(),
            MessageKey::PhotoCaptured => "photo-captured".into(),
            MessageKey::Countdown(n) => format!("countdown:{n}"),
        }
    }
}

pub fn localize(locale: Locale, key: MessageKey) -> String {
    use EdgeName::*;
    use Locale::*;
    use MessageKey::*;

    let text = match (key, locale) {
        (Countdown(n), _) => return n.to_string(),

        (AssistantEnabled, En) => "Camera assistant on. Hold your phone above the document.",
        (AssistantEnabled, De) => "Kameraassistent aktiv. Halten Sie das Telefon über das Dokument.",
        (AssistantEnabled, Fr) => "Assistant caméra activé. Tenez le téléphone au-dessus du document.",
        (AssistantEnabled, Es) => "Asistente de cámara activado. Sostenga el teléfono sobre el documento.",

        (GuidanceUnavailable, En) => "Edge detection unavailable. You can still take photos manually.",
        (GuidanceUnavailable, De) => "Kantenerkennung nicht verfügbar. Sie können weiterhin manuell fotografieren.",
        (GuidanceUnavailable, Fr) => "Détection des bords indisponible. Vous pouvez toujours photographier manuellement.",
        (GuidanceUnavailable, Es) => "Detección de bordes no disponible. Puede seguir tomando fotos manualmente.",

        (EdgesDetected, En) => "Document detected.",
        (EdgesDetected, De) => "Dokument erkannt.",
        (EdgesDetected, Fr) => "Document détecté.",
        (EdgesDetected, Es) => "Documento detectado.",

        (DocumentLost, En) => "Document lost.",
        (DocumentLost, De) => "Dokument verloren.",
        (DocumentLost, Fr) => "Document perdu.",
        (DocumentLost, Es) => "Documento perdido.",

        (EdgeNotVisible(Top), En) => "Top edge not visible.",
        (EdgeNotVisible(Bottom), En) => "Bottom edge not visible.",
        (EdgeNotVisible(Left), En) => "Left edge not visible.",
        (EdgeNotVisible(Right), En) => "Right edge not visible.",
        (EdgeNotVisible(Top), De) => "Oberer Rand nicht sichtbar.",
        (EdgeNotVisible(Bottom), De) => "Unterer Rand nicht sichtbar.",
        (EdgeNotVisible(Left), De) => "Linker Rand nicht sichtbar.",
        (EdgeNotVisible(Right), De) => "Rechter Rand nicht sichtbar.",
        (EdgeNotVisible(Top), Fr) => "Bord supérieur non visible.",
        (EdgeNotVisible(Bottom), Fr) => "Bord inférieur non visible.",
        (EdgeNotVisible(Left), Fr) => "Bord gauche non visible.",
        (EdgeNotVisible(Right), Fr) => "Bord droit non visible.",
        (EdgeNotVisible(Top), Es) => "Borde superior no visible.",
        (EdgeNotVisible(Bottom), Es) => "Borde inferior no visible.",
        (EdgeNotVisible(Left), Es) => "Borde izquierdo no visible.",
        (EdgeNotVisible(Right), Es) => "Borde derecho no visible.",

        (HoldSteady, En) => "Hold steady.",
        (HoldSteady, De) => "Ruhig halten.",
        (HoldSteady, Fr) => "Ne bougez plus.",
        (HoldSteady, Es) => "Mantenga quieto.",

        (PhotoCaptured, En) => "Photo captured.",
        (PhotoCaptured, De) => "Foto aufgenommen.",
        (PhotoCaptured, Fr) => "Photo prise.",
        (PhotoCaptured, Es) => "Foto tomada.",
    };

    text.to_string()
}
