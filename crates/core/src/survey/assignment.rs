/// Collection receiving the full payload of every submission.
pub const SUMMARY_COLLECTION: &str = "Resumen_Completo";

/// A category collection and the question indices it stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryAssignment {
    pub collection: &'static str,
    pub questions: &'static [u32],
}

const ASSIGNMENT: [CategoryAssignment; 5] = [
    CategoryAssignment {
        collection: "Estado_Emocional",
        questions: &[1, 2, 3, 4],
    },
    CategoryAssignment {
        collection: "Condiciones_de_Entorno",
        questions: &[5, 6, 7, 8],
    },
    CategoryAssignment {
        collection: "Apoyo_Social",
        questions: &[9, 10, 11],
    },
    CategoryAssignment {
        collection: "Balance_Vida_y_Trabajo",
        questions: &[12, 13],
    },
    CategoryAssignment {
        collection: "Evaluacion_General",
        questions: &[14, 15, 16],
    },
];

/// Category → question indices, in catalog order. The summary collection is
/// not part of it: it always receives the whole payload.
pub fn get_assignment() -> &'static [CategoryAssignment] {
    &ASSIGNMENT
}

/// Payload key for question `index` (`pregunta{index}`).
pub fn question_field(index: u32) -> String {
    format!("pregunta{}", index)
}
