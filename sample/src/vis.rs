use crate::{common::*, vocab::Vocab};

const CELL: i64 = 32;

/// Rasterizes one image's scene graph as a triple table.
///
/// Each triple becomes one row of three cells: the subject's palette
/// color, the predicate as a gray level, and the object's palette
/// color. Deterministic tensor ops only; no external renderer.
pub fn draw_scene_graph(
    objs: &Tensor,
    triples: &Tensor,
    vocab: &Vocab,
    palette: &Tensor,
) -> Result<Tensor> {
    let object_ids = Vec::<i64>::from(&objs.to_device(Device::Cpu));
    let triple_values = Vec::<i64>::from(&triples.to_device(Device::Cpu).reshape(&[-1]));
    let num_triples = (triple_values.len() / 3) as i64;
    let num_predicates = vocab.num_predicates() as i64;

    let rows = num_triples.max(1);
    let mut canvas = Tensor::full(&[3, rows * CELL, 3 * CELL], 255, FLOAT_CPU);

    for (row, chunk) in triple_values.chunks(3).enumerate() {
        let (subject, predicate, object) = match chunk {
            &[s, p, o] => (s, p, o),
            _ => unreachable!(),
        };
        let subject_id = *object_ids
            .get(usize::try_from(subject)?)
            .ok_or_else(|| format_err!("triple subject {} out of range", subject))?;
        let object_id = *object_ids
            .get(usize::try_from(object)?)
            .ok_or_else(|| format_err!("triple object {} out of range", object))?;
        ensure!(
            (0..num_predicates).contains(&predicate),
            "unknown predicate {}",
            predicate
        );
        vocab.object_name(subject_id)?;
        vocab.object_name(object_id)?;

        fill_cell(&mut canvas, row as i64, 0, &palette.get(subject_id))?;
        let shade = 255.0 * (predicate + 1) as f64 / (num_predicates + 1) as f64;
        let mut predicate_cell = cell(&canvas, row as i64, 1);
        let _ = predicate_cell.fill_(shade);
        fill_cell(&mut canvas, row as i64, 2, &palette.get(object_id))?;
    }

    Ok(canvas.to_kind(Kind::Uint8))
}

fn cell(canvas: &Tensor, row: i64, column: i64) -> Tensor {
    canvas
        .narrow(1, row * CELL, CELL)
        .narrow(2, column * CELL, CELL)
}

fn fill_cell(canvas: &mut Tensor, row: i64, column: i64, color: &Tensor) -> Result<()> {
    let mut target = cell(canvas, row, column);
    let color = color.view([3, 1, 1]).expand(&[3, CELL, CELL], false);
    target.copy_(&color);
    Ok(())
}
