/// Question statements, numbered from 1 in order.
pub const QUESTIONS: [&str; 16] = [
    "Me he sentido motivado para realizar mis tareas laborales.",
    "He sentido que manejo bien el estrés durante mi jornada.",
    "Me siento emocionalmente agotado al final del día.",
    "Me he sentido valorado por mi equipo de trabajo.",
    "Mi entorno de trabajo me permite concentrarme sin interrupciones constantes.",
    "Cuento con los recursos necesarios para cumplir con mis responsabilidades.",
    "La carga de trabajo ha sido adecuada esta semana.",
    "He tenido espacios suficientes para tomar pausas o descansos.",
    "Siento que puedo contar con mis compañeros si tengo un mal día.",
    "Me siento escuchado cuando comparto inquietudes en el equipo.",
    "Mis superiores muestran interés por el bienestar del equipo.",
    "He logrado mantener un equilibrio saludable entre mi vida laboral y personal.",
    "El trabajo no ha interferido negativamente con mi tiempo personal.",
    "En general, me he sentido bien emocionalmente esta semana.",
    "Me he sentido satisfecho con mis logros laborales recientes.",
    "Considero que esta semana ha sido positiva para mi desarrollo personal y profesional.",
];

/// Five-point answer scale; answer value is position + 1.
pub const ANSWER_SCALE: [&str; 5] = ["Nunca", "Rara vez", "A veces", "Frecuentemente", "Siempre"];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub number: u32,
    pub field: String,
    pub text: &'static str,
}

pub fn question_catalog() -> Vec<Question> {
    QUESTIONS
        .iter()
        .zip(1u32..)
        .map(|(text, number)| Question {
            number,
            field: super::question_field(number),
            text,
        })
        .collect()
}
