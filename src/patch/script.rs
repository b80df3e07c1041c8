/// Client-executable restore script
///
/// The script is pasted into the browser console of the canvas page. It
/// carries the instruction data plus fixed replay logic: fly the map to the
/// first instruction, then queue `pixelData.slice(0, charges)` where
/// `charges` is the painter's budget read at execution time.

use super::{Patch, TileCoords, TILE_SIZE};

const TEMPLATE: &str = r#"// canvas-warden restore script: @COUNT@ pixels on tile (@TX@, @TY@)
const tiles = [@TX@, @TY@];
const pixelData = @PIXELS@;

function toLatLng(x, y) {
    return data.ctx.crosshair.gm.pixelsToLatLon(x, y, 11);
}

function flyTo(x, y) {
    const [lat, lng] = toLatLng(x, y);
    data.ctx.map.flyTo({ center: { lat, lng }, zoom: 14 });
}

if (pixelData.length > 0) {
    flyTo(tiles[0] * @TILE@ + pixelData[0][0], tiles[1] * @TILE@ + pixelData[0][1]);
    const charges = Math.trunc(data.user.charges);
    setTimeout(() => {
        for (const [x, y, r, g, b, a, colorIdx] of pixelData.slice(0, charges)) {
            o.set(`t=(${tiles[0]},${tiles[1]});p=(${x},${y});s=0`, {
                color: { r, g, b, a },
                tile: tiles,
                pixel: [x, y],
                season: data.ctx.season,
                colorIdx,
            });
        }
        document.querySelector('button.btn-lg.relative').__click();
    }, 3000);
}
"#;

/// Render the restore script for `patch` on `tile`.
///
/// Each instruction is packed as `[x, y, r, g, b, a, ordinal]` in patch order.
pub fn render_script(patch: &Patch, tile: TileCoords) -> String {
    let rows: Vec<[u32; 7]> = patch
        .instructions
        .iter()
        .map(|p| {
            let [r, g, b, a] = p.color.0;
            [p.x, p.y, r.into(), g.into(), b.into(), a.into(), p.ordinal as u32]
        })
        .collect();

    // A Vec of integer arrays always serializes
    let pixels = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string());

    TEMPLATE
        .replace("@COUNT@", &rows.len().to_string())
        .replace("@TX@", &tile.x.to_string())
        .replace("@TY@", &tile.y.to_string())
        .replace("@TILE@", &TILE_SIZE.to_string())
        .replace("@PIXELS@", &pixels)
}
