//! Server-rendered survey form.

use std::fmt::Write;

use bienestar_core::survey::{question_catalog, ANSWER_SCALE};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Cuestionario de bienestar</title>
<style>
body { font-family: sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; }
fieldset { border: 1px solid #ccc; border-radius: 6px; margin-bottom: 1rem; }
.opciones-radio label { display: inline-block; margin-right: 1rem; }
#estado { font-weight: bold; }
</style>
</head>
<body>
<h1>Cuestionario de bienestar</h1>
<p>Este cuestionario es totalmente <strong>anónimo</strong>.</p>
<form id="formulario">
"#;

const PAGE_TAIL: &str = r#"<button type="submit">Enviar</button>
</form>
<p id="estado"></p>
<script>
document.getElementById('formulario').addEventListener('submit', async (e) => {
  e.preventDefault();
  const estado = document.getElementById('estado');
  const respuestas = {};
  for (const campo of document.querySelectorAll('fieldset[data-campo]')) {
    const marcada = campo.querySelector('input:checked');
    respuestas[campo.dataset.campo] = marcada ? parseInt(marcada.value, 10) : null;
  }
  if (Object.values(respuestas).some(v => v === null)) {
    estado.textContent = 'Por favor, responda todas las preguntas antes de enviar.';
    return;
  }
  try {
    const res = await fetch('/api/respuestas', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(respuestas)
    });
    const body = await res.json();
    estado.textContent = body.mensaje || (res.ok ? 'Respuestas enviadas.' : 'Error al enviar.');
  } catch (err) {
    estado.textContent = 'No se pudo enviar la información. Intenta más tarde.';
  }
});
</script>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_form() -> String {
    let mut page = String::from(PAGE_HEAD);
    for question in question_catalog() {
        let _ = writeln!(
            page,
            r#"<fieldset data-campo="{field}"><legend>{number}. {text}</legend><div class="opciones-radio">"#,
            field = question.field,
            number = question.number,
            text = escape_html(question.text),
        );
        for (value, label) in (1..).zip(ANSWER_SCALE.iter()) {
            let _ = writeln!(
                page,
                r#"<label><input type="radio" name="{field}" value="{value}" required> {value} - {label}</label>"#,
                field = question.field,
                value = value,
                label = escape_html(label),
            );
        }
        page.push_str("</div></fieldset>\n");
    }
    page.push_str(PAGE_TAIL);
    page
}
