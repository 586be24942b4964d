/// Canned study prompts, submitted as an ordinary user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Explication,
    Dissertation,
    CasPratique,
    Qcm,
    VraiFaux,
    ArretsDefinitions,
    ArretsCles,
}

impl QuickAction {
    pub const ALL: [QuickAction; 7] = [
        QuickAction::Explication,
        QuickAction::Dissertation,
        QuickAction::CasPratique,
        QuickAction::Qcm,
        QuickAction::VraiFaux,
        QuickAction::ArretsDefinitions,
        QuickAction::ArretsCles,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|action| action.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuickAction::Explication => "explication",
            QuickAction::Dissertation => "dissertation",
            QuickAction::CasPratique => "cas",
            QuickAction::Qcm => "qcm",
            QuickAction::VraiFaux => "vraifaux",
            QuickAction::ArretsDefinitions => "arretsdefin",
            QuickAction::ArretsCles => "arretscles",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuickAction::Explication => "Explication",
            QuickAction::Dissertation => "Dissertation",
            QuickAction::CasPratique => "Cas pratique",
            QuickAction::Qcm => "QCM",
            QuickAction::VraiFaux => "Vrai / Faux",
            QuickAction::ArretsDefinitions => "Arrêts (définitions)",
            QuickAction::ArretsCles => "Arrêts (notions clés)",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            QuickAction::Explication => "Expliquez-moi simplement la notion suivante :",
            QuickAction::Dissertation => {
                "Propose-moi un sujet de dissertation et un plan détaillé (I. II.) basé sur un ou plusieurs thèmes du cours que je vais t'indiquer."
            }
            QuickAction::CasPratique => {
                "Soumets-moi un petit cas pratique sur un ou plusieurs thèmes du cours que je vais t'indiquer."
            }
            QuickAction::Qcm => {
                "Génère successivement un QCM de 3 questions sur un ou plusieurs thèmes du cours que je vais t'indiquer."
            }
            QuickAction::VraiFaux => {
                "Propose-moi successivement 3 affirmations Vrai/Faux sur un ou plusieurs thèmes du cours que je vais t'indiquer."
            }
            QuickAction::ArretsDefinitions => "Listez les arrêts liés à des définitions, SVP.",
            QuickAction::ArretsCles => "Listez les arrêts liés à des notions clés, SVP.",
        }
    }

    /// Prompt with the user's topic appended, if any.
    pub fn prompt_with(&self, topic: &str) -> String {
        let topic = topic.trim();
        if topic.is_empty() {
            self.prompt().to_string()
        } else {
            format!("{} {}", self.prompt(), topic)
        }
    }
}
